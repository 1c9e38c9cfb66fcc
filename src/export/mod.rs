pub mod command;
pub mod export_config;
pub mod exporter;
pub mod file_ext;
pub mod mime;
pub mod postgres;
pub mod redacted;
pub mod result_error;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
