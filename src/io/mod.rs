pub(crate) mod index_file;
pub(crate) mod journal;
