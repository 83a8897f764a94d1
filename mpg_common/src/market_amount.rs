use std::{fmt::Display, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{encode::IsNull, error::BoxDynError, Database, Decode, Encode, Type};
use thiserror::Error;

use crate::op;

//--------------------------------------    MarketAmount     ---------------------------------------------------------

/// A monetary amount as reported by a payment provider.
///
/// Amounts are exact decimals, never binary floats, so that `"1.00"` survives a round trip through the database and
/// back out to a provider byte-for-byte. The database representation is TEXT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketAmount(Decimal);

op!(binary MarketAmount, Add, add);
op!(binary MarketAmount, Sub, sub);
op!(unary MarketAmount, Neg, neg);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a market amount: {0}")]
pub struct MarketAmountError(String);

impl MarketAmount {
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl From<Decimal> for MarketAmount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl FromStr for MarketAmount {
    type Err = MarketAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str_exact(s.trim()).map(Self).map_err(|e| MarketAmountError(format!("{s}: {e}")))
    }
}

impl Display for MarketAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<DB: Database> Type<DB> for MarketAmount
where String: Type<DB>
{
    fn type_info() -> DB::TypeInfo {
        <String as Type<DB>>::type_info()
    }

    fn compatible(ty: &DB::TypeInfo) -> bool {
        <String as Type<DB>>::compatible(ty)
    }
}

impl<'q, DB: Database> Encode<'q, DB> for MarketAmount
where String: Encode<'q, DB>
{
    fn encode_by_ref(&self, buf: &mut <DB as Database>::ArgumentBuffer<'q>) -> Result<IsNull, BoxDynError> {
        <String as Encode<'q, DB>>::encode(self.0.to_string(), buf)
    }
}

impl<'r, DB: Database> Decode<'r, DB> for MarketAmount
where &'r str: Decode<'r, DB>
{
    fn decode(value: <DB as Database>::ValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as Decode<'r, DB>>::decode(value)?;
        Self::from_str(s).map_err(Into::into)
    }
}
