pub mod archive;
pub mod csv_write;
pub mod excel_read;
pub mod publish;
