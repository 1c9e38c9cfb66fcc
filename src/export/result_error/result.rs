use crate::export::result_error::error::Error;
use crate::export::result_error::{AddFunctionName, AddMsg};
use itertools::Itertools;

pub type Result<T> = std::result::Result<T, Error>;

impl<S: Into<String>, R> AddFunctionName<S> for Result<R> {
    fn add_fn_name(self, fn_name: S) -> Self {
        self.map_err(|e| e.add_fn_name(fn_name))
    }
}

impl<R, S: Into<String>> AddMsg<S> for Result<R> {
    fn add_msg(self, msg: S) -> Self {
        self.map_err(|e| e.add_msg(msg))
    }
}

pub fn convert_error_vec(errors: Vec<Error>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::lots_of_error(
            errors.into_iter().flat_map(Error::into_iter).collect_vec(),
        ))
    }
}
