pub mod fs_blob_storage;
