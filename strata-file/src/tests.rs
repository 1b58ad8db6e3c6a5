//! End-to-end round-trip suite over the Stream and File containers.

use std::io::Write as _;
use std::sync::Arc;

use rand::Rng;
use rstest::rstest;
use strata_array::{ArrayData, ArrayRef, DataType, DictionaryType, PType, RecordBatch};
use strata_buffer::ByteBuffer;
use strata_error::StrataError;
use strata_ipc::stream::{StreamReader, StreamWriter};
use strata_ipc::{ReadOptions, WriteOptions};

use crate::{FileReader, FileWriter};

// ---- batch case generators ----------------------------------------------

fn some_unless_every_7th(i: usize) -> bool {
    i % 7 != 0
}

fn random_ints<T>(n: usize, lo: T, hi: T) -> Vec<Option<T>>
where
    T: rand::distr::uniform::SampleUniform + PartialOrd + Copy,
{
    let mut rng = rand::rng();
    (0..n)
        .map(|i| some_unless_every_7th(i).then(|| rng.random_range(lo..hi)))
        .collect()
}

fn int_batch() -> RecordBatch {
    let n = 10;
    RecordBatch::from_columns(vec![
        (
            "i8",
            ArrayData::primitive_nullable::<i8>(&random_ints(n, -100, 100)),
        ),
        (
            "i16",
            ArrayData::primitive_nullable::<i16>(&random_ints(n, -1000, 1000)),
        ),
        (
            "i32",
            ArrayData::primitive_nullable::<i32>(&random_ints(n, -1000, 1000)),
        ),
        (
            "i64",
            ArrayData::primitive_nullable::<i64>(&random_ints(n, -1000, 1000)),
        ),
        (
            "u32",
            ArrayData::primitive_nullable::<u32>(&random_ints(n, 0, 1000)),
        ),
        (
            "f32",
            ArrayData::primitive_nullable::<f32>(&[
                Some(1.5),
                None,
                Some(-0.25),
                Some(f32::MAX),
                Some(0.0),
                None,
                Some(3.25),
                Some(-1.0),
                Some(9.5),
                Some(2.0),
            ]),
        ),
        (
            "f64",
            ArrayData::primitive::<f64>(&[0.5, 1.5, 2.5, 3.5, 4.5, 5.5, 6.5, 7.5, 8.5, 9.5]),
        ),
    ])
    .unwrap()
}

fn non_null_batch() -> RecordBatch {
    RecordBatch::from_columns(vec![
        (
            "a",
            ArrayData::primitive::<i32>(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]),
        ),
        (
            "s",
            ArrayData::utf8(&"abcdefghij".split("").filter(|s| !s.is_empty()).map(Some).collect::<Vec<_>>()),
        ),
    ])
    .unwrap()
}

fn zero_length_batch() -> RecordBatch {
    let lists = ArrayData::list(ArrayData::primitive::<i32>(&[]), &[0], None).unwrap();
    RecordBatch::from_columns(vec![
        ("i", ArrayData::primitive::<i64>(&[])),
        ("s", ArrayData::utf8(&[])),
        ("b", ArrayData::bools(&[])),
        ("l", lists),
    ])
    .unwrap()
}

fn string_batch() -> RecordBatch {
    RecordBatch::from_columns(vec![
        (
            "utf8",
            ArrayData::utf8(&[
                Some("foo"),
                None,
                Some(""),
                Some("longer value"),
                Some("héllo"),
                None,
            ]),
        ),
        (
            "bytes",
            ArrayData::binary(&[
                Some(b"\x00\x01".as_slice()),
                Some(b"".as_slice()),
                None,
                Some(b"\xFF\xFE\xFD".as_slice()),
                None,
                Some(b"tail".as_slice()),
            ]),
        ),
    ])
    .unwrap()
}

fn list_batch() -> RecordBatch {
    let child = ArrayData::primitive_nullable::<i32>(&[
        Some(1),
        Some(2),
        None,
        Some(4),
        Some(5),
        Some(6),
        None,
        Some(8),
    ]);
    let lists = ArrayData::list(
        child,
        &[0, 3, 3, 5, 8],
        Some(&[true, false, true, true]),
    )
    .unwrap();
    RecordBatch::from_columns(vec![("l", lists)]).unwrap()
}

fn deeply_nested_list_batch() -> RecordBatch {
    let leaves = ArrayData::primitive::<i32>(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    let level1 = ArrayData::list(leaves, &[0, 2, 4, 7, 10], None).unwrap();
    let level2 =
        ArrayData::list(level1, &[0, 1, 3, 4], Some(&[true, true, false])).unwrap();
    let level3 = ArrayData::list(level2, &[0, 2, 3], None).unwrap();
    RecordBatch::from_columns(vec![("nested", level3)]).unwrap()
}

fn struct_batch() -> RecordBatch {
    let inner = ArrayData::struct_of(
        vec![
            (
                "a",
                ArrayData::primitive_nullable::<i32>(&[Some(1), None, Some(3), Some(4)]),
            ),
            ("b", ArrayData::utf8(&[Some("w"), Some("x"), None, Some("z")])),
        ],
        Some(&[true, true, false, true]),
    )
    .unwrap();
    RecordBatch::from_columns(vec![("st", inner)]).unwrap()
}

fn union_batch() -> RecordBatch {
    let sparse = ArrayData::sparse_union(
        vec![
            (5, "u0", ArrayData::primitive::<i32>(&[1, 2, 3, 4])),
            (10, "u1", ArrayData::primitive::<f64>(&[0.5, 1.5, 2.5, 3.5])),
        ],
        &[5, 10, 5, 10],
    )
    .unwrap();

    let dense = ArrayData::dense_union(
        vec![
            (5, "u0", ArrayData::primitive::<i32>(&[7, 8])),
            (10, "u1", ArrayData::utf8(&[Some("only")])),
        ],
        &[5, 5, 10, 5],
        &[0, 1, 0, 0],
    )
    .unwrap();

    RecordBatch::from_columns(vec![("sparse", sparse), ("dense", dense)]).unwrap()
}

fn shared_dictionary() -> Arc<DictionaryType> {
    Arc::new(
        DictionaryType::try_new(
            PType::I32,
            ArrayData::utf8(&[Some("foo"), Some("bar"), Some("baz")]),
        )
        .unwrap(),
    )
}

fn dictionary_batch() -> RecordBatch {
    let dict = shared_dictionary();
    let other = Arc::new(
        DictionaryType::try_new(PType::I32, ArrayData::utf8(&[Some("zip"), Some("zap")]))
            .unwrap(),
    );

    let d0 = ArrayData::dictionary::<i32>(dict.clone(), &[Some(0), Some(1), None, Some(2)])
        .unwrap();
    let d1 = ArrayData::dictionary::<i32>(dict.clone(), &[Some(2), Some(2), Some(0), None])
        .unwrap();
    let d2 =
        ArrayData::dictionary::<i32>(other, &[Some(1), Some(0), Some(1), Some(0)]).unwrap();
    let items = ArrayData::dictionary::<i32>(
        dict,
        &[Some(0), Some(1), Some(2), Some(0), Some(1), Some(2)],
    )
    .unwrap();
    let d3 = ArrayData::list(items, &[0, 2, 4, 5, 6], None).unwrap();

    RecordBatch::from_columns(vec![("d0", d0), ("d1", d1), ("d2", d2), ("d3", d3)]).unwrap()
}

fn fixed_width_batch() -> RecordBatch {
    let values = ArrayData::fixed_size_binary(
        4,
        &[
            Some(b"abcd".as_slice()),
            None,
            Some(b"\x00\x00\x00\x00".as_slice()),
            Some(b"wxyz".as_slice()),
        ],
    )
    .unwrap();
    RecordBatch::from_columns(vec![("fw", values)]).unwrap()
}

fn bool_batch() -> RecordBatch {
    RecordBatch::from_columns(vec![
        (
            "plain",
            ArrayData::bools(&[true, false, true, true, false, true, false, false, true]),
        ),
        (
            "nullable",
            ArrayData::bools_nullable(&[
                Some(true),
                None,
                Some(false),
                None,
                Some(true),
                Some(true),
                None,
                Some(false),
                Some(true),
            ]),
        ),
    ])
    .unwrap()
}

// ---- helpers -------------------------------------------------------------

fn write_stream(batches: &[RecordBatch], options: WriteOptions) -> Vec<u8> {
    let mut writer = StreamWriter::try_new_with_options(
        Vec::new(),
        batches[0].schema().clone(),
        options,
    )
    .unwrap();
    for batch in batches {
        writer.write_batch(batch).unwrap();
    }
    writer.finish().unwrap();
    writer.into_inner().unwrap()
}

fn read_stream(bytes: &[u8], options: ReadOptions) -> Vec<RecordBatch> {
    let mut reader = StreamReader::try_new_with_options(bytes, options).unwrap();
    let mut out = Vec::new();
    while let Some(batch) = reader.next_batch().unwrap() {
        out.push(batch);
    }
    // Done is terminal: the end-of-stream signal arrives exactly once and
    // every further call keeps returning None.
    assert!(reader.next_batch().unwrap().is_none());
    out
}

fn stream_round_trip(batch: &RecordBatch) -> RecordBatch {
    let bytes = write_stream(std::slice::from_ref(batch), WriteOptions::default());
    let mut decoded = read_stream(&bytes, ReadOptions::default());
    assert_eq!(decoded.len(), 1);
    decoded.remove(0)
}

fn write_file(batches: &[RecordBatch]) -> ByteBuffer {
    let mut writer = FileWriter::try_new(Vec::new(), batches[0].schema().clone()).unwrap();
    for batch in batches {
        writer.write_batch(batch).unwrap();
    }
    writer.finish().unwrap();
    ByteBuffer::from(writer.into_inner().unwrap())
}

// ---- round trips ---------------------------------------------------------

#[rstest]
#[case::ints(int_batch)]
#[case::non_null(non_null_batch)]
#[case::zero_length(zero_length_batch)]
#[case::strings(string_batch)]
#[case::lists(list_batch)]
#[case::deeply_nested(deeply_nested_list_batch)]
#[case::structs(struct_batch)]
#[case::unions(union_batch)]
#[case::dictionaries(dictionary_batch)]
#[case::fixed_width(fixed_width_batch)]
#[case::bools(bool_batch)]
fn round_trip_through_stream(#[case] make: fn() -> RecordBatch) {
    let batch = make();
    assert_eq!(stream_round_trip(&batch), batch);
}

#[rstest]
#[case::ints(int_batch)]
#[case::non_null(non_null_batch)]
#[case::zero_length(zero_length_batch)]
#[case::strings(string_batch)]
#[case::lists(list_batch)]
#[case::deeply_nested(deeply_nested_list_batch)]
#[case::structs(struct_batch)]
#[case::unions(union_batch)]
#[case::dictionaries(dictionary_batch)]
#[case::fixed_width(fixed_width_batch)]
#[case::bools(bool_batch)]
fn round_trip_through_file(#[case] make: fn() -> RecordBatch) {
    let batch1 = make();
    let batch2 = make();
    let file = write_file(&[batch1.clone(), batch2.clone()]);

    let reader = FileReader::open(file).unwrap();
    assert_eq!(reader.count(), 2);
    assert_eq!(reader.get_batch(0).unwrap(), batch1);
    assert_eq!(reader.get_batch(1).unwrap(), batch2);
}

#[rstest]
#[case::ints(int_batch)]
#[case::strings(string_batch)]
#[case::lists(list_batch)]
#[case::deeply_nested(deeply_nested_list_batch)]
#[case::structs(struct_batch)]
#[case::unions(union_batch)]
#[case::dictionaries(dictionary_batch)]
#[case::bools(bool_batch)]
fn slice_round_trip(#[case] make: fn() -> RecordBatch) {
    let batch = make();
    if batch.num_rows() < 2 {
        return;
    }
    let len = (batch.num_rows() - 2).min(10);
    let sliced = batch.slice(2, len);
    assert_eq!(stream_round_trip(&sliced), sliced);
}

#[rstest]
#[case::ints(int_batch)]
#[case::strings(string_batch)]
#[case::lists(list_batch)]
#[case::structs(struct_batch)]
#[case::bools(bool_batch)]
fn zero_length_slice_round_trip(#[case] make: fn() -> RecordBatch) {
    let batch = make();
    let sliced = if batch.num_rows() > 2 {
        batch.slice(2, 0)
    } else {
        batch.slice(0, 0)
    };
    assert_eq!(stream_round_trip(&sliced), sliced);
}

#[rstest]
#[case::ints(int_batch)]
#[case::zero_length(zero_length_batch)]
#[case::lists(list_batch)]
#[case::non_null(non_null_batch)]
#[case::deeply_nested(deeply_nested_list_batch)]
fn batch_size_matches_written_bytes(#[case] make: fn() -> RecordBatch) {
    let batch = make();
    let mut writer = strata_ipc::messages::SyncMessageWriter::new(Vec::new());
    writer.write_batch(&batch, &WriteOptions::default()).unwrap();
    let written = writer.into_inner().unwrap().len() as u64;
    assert_eq!(strata_ipc::batch::get_batch_size(&batch).unwrap(), written);
}

// ---- container semantics -------------------------------------------------

#[test]
fn stream_preserves_write_order() {
    let batches = (0..5)
        .map(|i| {
            RecordBatch::from_columns(vec![(
                "a",
                ArrayData::primitive::<i64>(&[i, i * 10, i * 100]),
            )])
            .unwrap()
        })
        .collect::<Vec<_>>();

    let bytes = write_stream(&batches, WriteOptions::default());
    let decoded = read_stream(&bytes, ReadOptions::default());
    assert_eq!(decoded, batches);
}

#[test]
fn empty_stream_carries_only_a_schema() {
    let batch = int_batch();
    let mut writer = StreamWriter::try_new(Vec::new(), batch.schema().clone()).unwrap();
    writer.finish().unwrap();
    let bytes = writer.into_inner().unwrap();

    let mut reader = StreamReader::try_new(bytes.as_slice()).unwrap();
    assert_eq!(reader.schema(), batch.schema());
    assert!(reader.next_batch().unwrap().is_none());
}

#[test]
fn closed_writers_reject_further_batches() {
    let batch = int_batch();
    let mut writer = StreamWriter::try_new(Vec::new(), batch.schema().clone()).unwrap();
    writer.write_batch(&batch).unwrap();
    writer.finish().unwrap();

    let err = writer.write_batch(&batch).unwrap_err();
    assert!(matches!(err, StrataError::InvalidArgument(_)));
    assert!(writer.finish().is_err());
}

#[test]
fn file_serves_batches_in_any_order() {
    let batches = (0..4)
        .map(|i| {
            RecordBatch::from_columns(vec![(
                "x",
                ArrayData::primitive::<i32>(&[i, i + 1, i + 2, i + 3]),
            )])
            .unwrap()
        })
        .collect::<Vec<_>>();

    let reader = FileReader::open(write_file(&batches)).unwrap();
    assert_eq!(reader.count(), 4);
    for i in [2usize, 0, 3, 1, 2] {
        assert_eq!(reader.get_batch(i).unwrap(), batches[i]);
    }
    assert!(reader.get_batch(4).is_err());
}

#[test]
fn file_round_trips_through_disk_and_mmap() {
    let batches = vec![string_batch(), string_batch()];
    let file_bytes = write_file(&batches);

    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(file_bytes.as_slice()).unwrap();
    tmp.flush().unwrap();

    let reader = FileReader::open_path(tmp.path()).unwrap();
    assert_eq!(reader.count(), 2);
    assert_eq!(reader.get_batch(1).unwrap(), batches[1]);
    assert_eq!(reader.get_batch(0).unwrap(), batches[0]);
}

#[test]
fn open_rejects_corrupt_trailers() {
    let file = write_file(&[int_batch()]);
    let len = file.len();

    // Bad magic.
    let mut corrupt = file.as_slice().to_vec();
    corrupt[len - 1] ^= 0xFF;
    let err = FileReader::open(ByteBuffer::from(corrupt)).unwrap_err();
    assert!(err.to_string().contains("bad magic"), "{}", err);

    // Footer length pointing past the start of the file.
    let mut corrupt = file.as_slice().to_vec();
    corrupt[len - 8..len - 4].copy_from_slice(&u32::MAX.to_le_bytes());
    let err = FileReader::open(ByteBuffer::from(corrupt)).unwrap_err();
    assert!(err.to_string().contains("does not fit"), "{}", err);

    // Too small to hold a trailer at all.
    let err = FileReader::open(ByteBuffer::from(vec![0u8; 4])).unwrap_err();
    assert!(matches!(err, StrataError::InvalidFormat(_)));
}

// ---- dictionaries --------------------------------------------------------

fn assert_dictionaries_shared(batch: &RecordBatch) {
    let schema = batch.schema();
    let (DataType::Dictionary(t0), DataType::Dictionary(t1), DataType::Dictionary(t2)) = (
        schema.field(0).dtype(),
        schema.field(1).dtype(),
        schema.field(2).dtype(),
    ) else {
        panic!("expected dictionary fields");
    };
    assert!(t0.same_payload(t1), "d0 and d1 must share one payload");
    assert!(!t0.same_payload(t2), "d2 has its own payload");

    // The list column's items use the same payload as d0.
    let DataType::List(item) = schema.field(3).dtype() else {
        panic!("expected a list field");
    };
    let DataType::Dictionary(t3) = item.dtype() else {
        panic!("expected dictionary list items");
    };
    assert!(t0.same_payload(t3), "nested dictionary must share the payload");
}

#[test]
fn stream_dictionaries_resolve_to_shared_payloads() {
    let batch = dictionary_batch();
    let decoded = stream_round_trip(&batch);
    assert_dictionaries_shared(&decoded);
}

#[test]
fn file_dictionaries_resolve_to_shared_payloads() {
    let batch = dictionary_batch();
    let reader = FileReader::open(write_file(&[batch])).unwrap();
    // Two distinct payloads were written, despite four dictionary uses.
    assert_eq!(reader.dictionary_count(), 2);
    assert_dictionaries_shared(&reader.get_batch(0).unwrap());
}

#[test]
fn repeated_batches_never_reemit_dictionaries() {
    let batch = dictionary_batch();
    let file = write_file(&[batch.clone(), batch.clone(), batch]);
    let reader = FileReader::open(file).unwrap();
    assert_eq!(reader.dictionary_count(), 2);
    assert_eq!(reader.count(), 3);
}

// ---- recursion limits ----------------------------------------------------

/// A single-row list nested `depth` levels over a small i32 leaf.
fn nested_lists(depth: usize) -> ArrayRef {
    let mut array = ArrayData::primitive::<i32>(&[1, 2, 3]);
    for _ in 0..depth {
        let len = i32::try_from(array.len()).unwrap();
        array = ArrayData::list(array, &[0, len], None).unwrap();
    }
    array
}

fn nested_batch(depth: usize) -> RecordBatch {
    RecordBatch::from_columns(vec![("deep", nested_lists(depth))]).unwrap()
}

#[test]
fn writing_past_the_recursion_limit_fails() {
    let batch = nested_batch(257);
    let mut writer = StreamWriter::try_new(Vec::new(), batch.schema().clone()).unwrap();
    let err = writer.write_batch(&batch).unwrap_err();
    assert!(matches!(
        err,
        StrataError::RecursionLimitExceeded { limit: 256, .. }
    ));
}

#[test]
fn writing_exactly_at_the_recursion_limit_succeeds() {
    let batch = nested_batch(256);
    let bytes = write_stream(std::slice::from_ref(&batch), WriteOptions::default());
    let decoded = read_stream(&bytes, ReadOptions::default());
    assert_eq!(decoded, vec![batch]);
}

#[test]
fn readers_enforce_their_own_limit() {
    // Written with a raised bound, read back with the default: the
    // reader's bound governs.
    let batch = nested_batch(300);
    let bytes = write_stream(
        std::slice::from_ref(&batch),
        WriteOptions::with_max_depth(301),
    );

    let err = StreamReader::try_new(bytes.as_slice()).unwrap_err();
    assert!(matches!(
        err,
        StrataError::RecursionLimitExceeded { limit: 256, .. }
    ));

    let decoded = read_stream(&bytes, ReadOptions::with_max_depth(301));
    assert_eq!(decoded, vec![batch]);
}

#[rstest]
#[case(100)]
#[case(500)]
fn deep_nesting_round_trips_with_raised_limits(#[case] depth: usize) {
    let batch = nested_batch(depth);
    let bytes = write_stream(
        std::slice::from_ref(&batch),
        WriteOptions::with_max_depth(depth + 1),
    );
    let decoded = read_stream(&bytes, ReadOptions::with_max_depth(depth + 1));
    assert_eq!(decoded, vec![batch]);
}

// ---- the 64-bit large-batch path ----------------------------------------

#[test]
fn large_batches_need_the_file_writers_64bit_mode() {
    // 2^31 + 8 rows of booleans: small enough in bytes to materialize,
    // too many rows for the 32-bit layout.
    let rows = (1usize << 31) + 8;
    let values = ByteBuffer::zeroed(rows / 8);
    let column =
        ArrayData::try_new(DataType::Bool, rows, 0, None, vec![values.clone()], vec![])
            .unwrap();
    let batch = RecordBatch::from_columns(vec![("flags", column)]).unwrap();

    // The single-shot path refuses.
    let err =
        strata_ipc::batch::encode_batch(&batch, &WriteOptions::default()).unwrap_err();
    assert!(matches!(err, StrataError::UnsupportedLayout(_)));

    // The file writer's explicit large-batch mode does not.
    let sink = Vec::with_capacity(rows / 8 + (1 << 16));
    let mut writer = FileWriter::try_new(sink, batch.schema().clone()).unwrap();
    writer
        .write_batch_with(
            &batch,
            &WriteOptions {
                allow_64bit: true,
                ..Default::default()
            },
        )
        .unwrap();
    writer.finish().unwrap();
    let file = ByteBuffer::from(writer.into_inner().unwrap());

    let reader = FileReader::open(file).unwrap();
    assert_eq!(reader.count(), 1);
    let decoded = reader.get_batch(0).unwrap();
    assert_eq!(decoded.num_rows(), rows);
    let column = decoded.column(0);
    assert_eq!(column.null_count(), 0);
    // Row-by-row comparison would crawl at this scale; the bitmap bytes
    // carry the values exactly.
    assert_eq!(column.buffers()[0].as_slice(), values.as_slice());
}

// ---- zero-length edge cases ---------------------------------------------

#[test]
fn zero_length_binary_with_absent_buffers_decodes() {
    let absent = ArrayData::try_new(
        DataType::Binary,
        0,
        0,
        None,
        vec![ByteBuffer::empty(), ByteBuffer::empty()],
        vec![],
    )
    .unwrap();
    let single_offset = ArrayData::try_new(
        DataType::Binary,
        0,
        0,
        None,
        vec![ByteBuffer::copy_from_typed(&[0i32]), ByteBuffer::empty()],
        vec![],
    )
    .unwrap();

    for column in [absent, single_offset] {
        let batch = RecordBatch::from_columns(vec![("b", column)]).unwrap();
        let decoded = stream_round_trip(&batch);
        assert_eq!(decoded, batch);
        assert_eq!(decoded.column(0).as_ref(), ArrayData::binary(&[]).as_ref());
    }
}
