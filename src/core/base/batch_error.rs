use crate::{Error, Result};
use std::fmt;

/// `BatchError` collects several errors without masking any of them.
#[derive(Debug, Default)]
pub struct BatchError {
    errs: Vec<Error>,
}

impl BatchError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, err: Error) {
        self.errs.push(err);
    }

    pub fn len(&self) -> usize {
        self.errs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errs.is_empty()
    }

    pub fn errors(&self) -> &[Error] {
        &self.errs
    }

    /// `into_result` is `Ok(())` for an empty batch, otherwise the batch itself as the error.
    pub fn into_result(self) -> Result<()> {
        if self.errs.is_empty() {
            Ok(())
        } else {
            Err(Error::new(self))
        }
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errs.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty() {
        let be = BatchError::new();
        assert!(be.is_empty());
        assert!(be.into_result().is_ok());
    }

    #[test]
    fn collect_all() {
        let mut be = BatchError::new();
        be.add(Error::msg("first"));
        be.add(Error::msg("second"));
        assert_eq!(be.len(), 2);
        let err = be.into_result().unwrap_err();
        assert_eq!(err.to_string(), "first\nsecond");
        let be = err.downcast_ref::<BatchError>().unwrap();
        assert_eq!(be.errors().len(), 2);
    }
}
