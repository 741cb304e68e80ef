mod entry;

pub use entry::{extract_package_name, extract_pid, extract_process_name, parse_entry};
