pub mod backup_config;
pub mod backuper;
pub mod executor;
pub mod host;
pub mod include;
pub mod lock;
pub mod notifications;
pub mod redacted;
pub mod report;
pub mod result_error;
pub mod stopwatch;
pub mod transport;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
