//! Request and response bodies

use rust_decimal::Decimal;
use validator::ValidationError;

pub mod invoices;
pub mod payments;

pub(crate) fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut error = ValidationError::new("non_negative");
        error.message = Some("must not be negative".into());
        return Err(error);
    }
    Ok(())
}
