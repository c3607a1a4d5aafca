//! 用户与地址字段校验
//!
//! 长度均按字符计算

use crate::error::{RegistryError, RegistryResult};
use crate::types::{AddressFields, AddressRequest};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$")
            .unwrap();
    static ref PASSWORD_RE: Regex = Regex::new(r"^[A-Za-z0-9]{8,}$").unwrap();
    static ref STATE_RE: Regex = Regex::new(r"^[A-Za-z]{2}$").unwrap();
    static ref CEP_RE: Regex = Regex::new(r"^[0-9]{5}-[0-9]{3}$").unwrap();
}

pub const NAME_MIN: usize = 2;
pub const NAME_MAX: usize = 100;
pub const EMAIL_MAX: usize = 255;

/// 校验必填字段长度
pub fn validate_length(field: &str, value: &str, min: usize, max: usize) -> RegistryResult<()> {
    let len = value.chars().count();
    if len == 0 {
        return Err(RegistryError::Validation(format!("{field} must not be empty")));
    }
    if len < min {
        return Err(RegistryError::Validation(format!(
            "{field} must be at least {min} characters"
        )));
    }
    if len > max {
        return Err(RegistryError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> RegistryResult<()> {
    validate_length("user_name", name, NAME_MIN, NAME_MAX)
}

pub fn validate_email(email: &str) -> RegistryResult<()> {
    validate_length("user_email", email, 1, EMAIL_MAX)?;
    if !EMAIL_RE.is_match(email) {
        return Err(RegistryError::Validation(
            "user_email is not a valid address".to_string(),
        ));
    }
    Ok(())
}

/// 至少 8 位，仅字母和数字，且包含小写、大写和数字
pub fn validate_password(password: &str) -> RegistryResult<()> {
    let strong = PASSWORD_RE.is_match(password)
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit());

    if !strong {
        return Err(RegistryError::Validation(
            "user_password is too weak".to_string(),
        ));
    }
    Ok(())
}

/// 校验并整理地址请求
pub fn validate_address(request: &AddressRequest) -> RegistryResult<AddressFields> {
    validate_length("address_street", &request.address_street, 2, 200)?;
    validate_length("address_number", &request.address_number, 1, 10)?;
    validate_length("address_neighborhood", &request.address_neighborhood, 2, 80)?;
    validate_length("address_city", &request.address_city, 2, 100)?;

    if !STATE_RE.is_match(&request.address_state) {
        return Err(RegistryError::Validation(
            "address_state must be exactly 2 letters".to_string(),
        ));
    }

    if !CEP_RE.is_match(&request.address_cep) {
        return Err(RegistryError::Validation(
            "address_cep must match NNNNN-NNN".to_string(),
        ));
    }

    Ok(AddressFields {
        street: request.address_street.clone(),
        number: request.address_number.clone(),
        neighborhood: request.address_neighborhood.clone(),
        city: request.address_city.clone(),
        state: request.address_state.clone(),
        cep: request.address_cep.clone(),
    })
}
