//! Verification requests.
//!
//! A [`VerificationForm`] is what arrives over the wire: every field optional.
//! [`VerificationRequest::from_form`] turns it into a typed request or lists
//! exactly what is missing, so nothing downstream branches on field presence.

use crate::error::{Error, Result};
use crate::store::{AccountId, AttemptType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Loosely-typed request as submitted by the merchant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationForm {
    /// Target store.
    pub store_id: String,
    /// Existing account to re-verify.
    #[serde(default)]
    pub account_id: Option<String>,
    /// `bank` (default) or `upi`.
    #[serde(default)]
    pub account_type: Option<String>,
    /// Bank: account holder name.
    #[serde(default)]
    pub account_holder_name: Option<String>,
    /// Bank: account number.
    #[serde(default)]
    pub account_number: Option<String>,
    /// Bank: IFSC routing code.
    #[serde(default)]
    pub ifsc_code: Option<String>,
    /// Bank: bank name.
    #[serde(default)]
    pub bank_name: Option<String>,
    /// Bank: branch name.
    #[serde(default)]
    pub branch_name: Option<String>,
    /// UPI: virtual payment address.
    #[serde(default)]
    pub upi_id: Option<String>,
    /// UPI: name shown for the handle.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Bank account details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankDetails {
    /// Claimed account holder name.
    pub holder_name: String,
    /// Digits only.
    pub account_number: String,
    /// Upper-cased IFSC.
    pub ifsc_code: String,
    /// Bank name.
    pub bank_name: String,
    /// Branch name.
    pub branch_name: Option<String>,
}

/// UPI handle details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpiDetails {
    /// Lower-cased virtual payment address.
    pub upi_id: String,
    /// Claimed name for the handle.
    pub display_name: Option<String>,
}

/// Instrument-specific part of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountDetails {
    /// Bank account.
    Bank(BankDetails),
    /// UPI handle.
    Upi(UpiDetails),
}

impl AccountDetails {
    /// Attempt type this request counts against.
    #[must_use]
    pub fn attempt_type(&self) -> AttemptType {
        match self {
            Self::Bank(_) => AttemptType::Bank,
            Self::Upi(_) => AttemptType::Upi,
        }
    }

    /// Holder name to check against the store's identities, if one is claimed.
    #[must_use]
    pub fn claimed_name(&self) -> Option<&str> {
        match self {
            Self::Bank(bank) => Some(&bank.holder_name),
            Self::Upi(upi) => upi.display_name.as_deref(),
        }
    }
}

/// A validated verification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    /// Target store.
    pub store_id: String,
    /// Existing account to re-verify.
    pub account_id: Option<AccountId>,
    /// Instrument details.
    pub details: AccountDetails,
}

fn present(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn invalid(field: &str, reason: &str) -> Error {
    Error::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// `AAAA0XXXXXX`: four letters, a zero, six alphanumerics.
fn is_valid_ifsc(ifsc: &str) -> bool {
    let bytes = ifsc.as_bytes();
    bytes.len() == 11
        && bytes[..4].iter().all(u8::is_ascii_uppercase)
        && bytes[4] == b'0'
        && bytes[5..].iter().all(u8::is_ascii_alphanumeric)
}

fn is_valid_upi(upi: &str) -> bool {
    let Some((user, handle)) = upi.split_once('@') else {
        return false;
    };
    let user_ok = (2..=256).contains(&user.len())
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    let handle_ok = (2..=64).contains(&handle.len())
        && handle.chars().all(|c| c.is_ascii_alphanumeric());
    user_ok && handle_ok
}

impl VerificationRequest {
    /// Validate a submitted form.
    ///
    /// # Errors
    ///
    /// [`Error::MissingFields`] naming every absent required field, or
    /// [`Error::InvalidField`] for the first malformed one.
    pub fn from_form(form: &VerificationForm) -> Result<Self> {
        let account_id = match present(form.account_id.as_ref()) {
            Some(raw) => Some(
                Uuid::parse_str(&raw).map_err(|_| invalid("account_id", "not a valid id"))?,
            ),
            None => None,
        };

        let account_type = present(form.account_type.as_ref())
            .map_or(Some(AttemptType::Bank), |t| {
                AttemptType::parse(&t.to_ascii_lowercase())
            })
            .ok_or_else(|| invalid("account_type", "must be 'bank' or 'upi'"))?;

        let details = match account_type {
            AttemptType::Bank => AccountDetails::Bank(Self::bank_details(form)?),
            AttemptType::Upi => AccountDetails::Upi(Self::upi_details(form)?),
        };

        Ok(Self {
            store_id: form.store_id.trim().to_string(),
            account_id,
            details,
        })
    }

    fn bank_details(form: &VerificationForm) -> Result<BankDetails> {
        let holder_name = present(form.account_holder_name.as_ref());
        let account_number = present(form.account_number.as_ref());
        let ifsc_code = present(form.ifsc_code.as_ref());
        let bank_name = present(form.bank_name.as_ref());

        let (Some(holder_name), Some(account_number), Some(ifsc_code), Some(bank_name)) =
            (&holder_name, &account_number, &ifsc_code, &bank_name)
        else {
            let missing = [
                ("account_holder_name", holder_name.is_none()),
                ("account_number", account_number.is_none()),
                ("ifsc_code", ifsc_code.is_none()),
                ("bank_name", bank_name.is_none()),
            ]
            .into_iter()
            .filter(|(_, absent)| *absent)
            .map(|(name, _)| name.to_string())
            .collect();
            return Err(Error::MissingFields(missing));
        };

        let account_number: String = account_number
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if !(9..=18).contains(&account_number.len())
            || !account_number.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid("account_number", "must be 9 to 18 digits"));
        }

        let ifsc_code = ifsc_code.to_ascii_uppercase();
        if !is_valid_ifsc(&ifsc_code) {
            return Err(invalid("ifsc_code", "must look like ABCD0123456"));
        }

        Ok(BankDetails {
            holder_name: holder_name.clone(),
            account_number,
            ifsc_code,
            bank_name: bank_name.clone(),
            branch_name: present(form.branch_name.as_ref()),
        })
    }

    fn upi_details(form: &VerificationForm) -> Result<UpiDetails> {
        let Some(upi_id) = present(form.upi_id.as_ref()) else {
            return Err(Error::MissingFields(vec!["upi_id".to_string()]));
        };
        let upi_id = upi_id.to_ascii_lowercase();
        if !is_valid_upi(&upi_id) {
            return Err(invalid("upi_id", "must look like name@bank"));
        }
        Ok(UpiDetails {
            upi_id,
            display_name: present(form.display_name.as_ref()),
        })
    }
}

/// Replace all but the last four digits with `X`.
#[must_use]
pub fn mask_account_number(account_number: &str) -> String {
    let len = account_number.chars().count();
    account_number
        .chars()
        .enumerate()
        .map(|(i, c)| if i + 4 < len { 'X' } else { c })
        .collect()
}
