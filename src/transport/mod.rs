/// Filesystem helpers shared by loaders and report writers.
pub mod fs;
/// Tab-separated codec for every tabular file the pipeline reads or writes.
pub mod tsv;
