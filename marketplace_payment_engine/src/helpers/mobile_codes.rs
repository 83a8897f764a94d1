//! The mobile country-code table used to vet carrier-billing `network` fields.
//!
//! Bango reports the billing network as `COUNTRY_CARRIER`, e.g. `ESP_MOVISTAR`. The country half must be one we
//! have actually launched carrier billing in; a typo or a region we do not serve is rejected at parse time rather
//! than stored as junk on the transaction.

use crate::errors::ParseError;

/// Region identifier and its ITU mobile country code, for every region with an active carrier-billing agreement.
const MOBILE_COUNTRY_CODES: &[(&str, u16)] = &[
    ("BGD", 470),
    ("BRA", 724),
    ("CHL", 730),
    ("COL", 732),
    ("CZE", 230),
    ("DEU", 262),
    ("ESP", 214),
    ("FRA", 208),
    ("GBR", 234),
    ("GRC", 202),
    ("HUN", 216),
    ("IND", 404),
    ("ITA", 222),
    ("MEX", 334),
    ("MNE", 297),
    ("PER", 716),
    ("POL", 260),
    ("SRB", 220),
    ("URY", 748),
    ("USA", 310),
    ("VEN", 734),
    ("ZAF", 655),
];

/// A vetted `COUNTRY_CARRIER` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobileNetwork {
    pub carrier: String,
    pub region: String,
}

/// Splits and vets a `network` field. The country part must appear in the mobile country-code table; the carrier
/// part is free-form but must be non-empty.
pub fn carrier_for_network(network: &str) -> Result<MobileNetwork, ParseError> {
    let invalid = |reason: String| ParseError::InvalidField { field: "network".to_string(), reason };
    let (region, carrier) =
        network.split_once('_').ok_or_else(|| invalid(format!("'{network}' is not of the form COUNTRY_CARRIER")))?;
    let region = region.to_ascii_uppercase();
    if mobile_country_code(&region).is_none() {
        return Err(invalid(format!("'{region}' is not a region we bill in")));
    }
    if carrier.is_empty() {
        return Err(invalid(format!("'{network}' names no carrier")));
    }
    Ok(MobileNetwork { carrier: carrier.to_ascii_uppercase(), region })
}

/// The ITU mobile country code for a region identifier, if we bill there.
pub fn mobile_country_code(region: &str) -> Option<u16> {
    MOBILE_COUNTRY_CODES.iter().find(|(r, _)| *r == region).map(|(_, mcc)| *mcc)
}
