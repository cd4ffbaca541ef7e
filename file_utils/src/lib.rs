mod safe_file_creator;

pub use safe_file_creator::{is_temp_file_name, SafeFileCreator, TEMP_FILE_SUFFIX};
