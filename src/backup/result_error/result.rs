use crate::backup::result_error::error::Error;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use std::fmt::Debug;

pub type Result<T> = std::result::Result<T, Error>;

impl<S: Into<String>, O: Debug + Send + 'static, R> WithDebugObjectAndFnName<S, O> for Result<R> {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        self.map_err(|e| e.with_debug_object_and_fn_name(obj, fn_name))
    }
}

impl<R, S: Into<String>> WithMsg<S> for Result<R> {
    fn with_msg(self, msg: S) -> Self {
        self.map_err(|e| e.with_msg(msg))
    }
}

/// Collapses the errors gathered while doing several independent things into
/// a single result: `Ok` when nothing failed.
pub fn convert_error_vec(errors: Vec<Error>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_error_vec() {
        assert!(convert_error_vec(vec![]).is_ok());

        let errors = vec![
            Error::SmtpSend("status".to_string()),
            Error::SmtpSend("errors".to_string()),
        ];
        match convert_error_vec(errors) {
            Err(Error::LotsOfError(v)) => assert_eq!(v.len(), 2),
            _ => panic!("Expected LotsOfError"),
        }
    }

    #[test]
    fn test_result_with_msg() {
        let res: Result<()> = Err(Error::UnknownHost("foo.test".to_string()));
        let res = res.with_msg("Host filter failed");

        match res {
            Err(Error::WithMsg { msg, .. }) => assert_eq!(msg, "Host filter failed"),
            _ => panic!("Expected WithMsg error"),
        }
    }
}
