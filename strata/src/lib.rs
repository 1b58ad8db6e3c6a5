//! The Strata columnar IPC format.
//!
//! One crate to pull in the whole stack: in-memory arrays and schemas, the
//! message codec, the sequential Stream protocol, and the random-access
//! File container.
//!
//! ```
//! use strata::array::{ArrayData, RecordBatch};
//! use strata::file::{FileReader, FileWriter};
//!
//! let batch = RecordBatch::from_columns(vec![
//!     ("id", ArrayData::primitive::<i64>(&[1, 2, 3])),
//!     ("name", ArrayData::utf8(&[Some("ok"), None, Some("end")])),
//! ])
//! .unwrap();
//!
//! let mut writer = FileWriter::try_new(Vec::new(), batch.schema().clone()).unwrap();
//! writer.write_batch(&batch).unwrap();
//! writer.finish().unwrap();
//!
//! let file = strata::buffer::ByteBuffer::from(writer.into_inner().unwrap());
//! let reader = FileReader::open(file).unwrap();
//! assert_eq!(reader.get_batch(0).unwrap(), batch);
//! ```

pub use strata_array::*;
pub use {
    strata_array as array, strata_buffer as buffer, strata_error as error, strata_file as file,
    strata_io as io, strata_ipc as ipc,
};
