//! Persisted records and the small value types they are built from
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::fmt;

/// Platform-assigned identifier of a chat participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(pub i64);

impl UserId {
    /// Big-endian bytes, used as the sled key so ids sort numerically.
    pub fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
    pub fn from_key(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(i64::from_be_bytes(raw)))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        UserId(value)
    }
}

/// Money in minor units (two decimals). Catalog files carry plain numbers,
/// so deserialization goes through `f64` and rounds to the nearest minor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(from = "f64")]
pub struct Price(u64);

impl Price {
    pub const fn from_minor(minor: u64) -> Self {
        Price(minor)
    }
    pub const fn from_major(major: u64) -> Self {
        Price(major * 100)
    }
    pub fn minor(&self) -> u64 {
        self.0
    }
    /// Reduce by `percent`, rounding half-up to the minor unit.
    pub fn discounted(&self, percent: u32) -> Price {
        let keep = 100u128.saturating_sub(u128::from(percent));
        let minor = (u128::from(self.0) * keep + 50) / 100;
        Price(u64::try_from(minor).unwrap_or(u64::MAX))
    }
}

impl From<f64> for Price {
    fn from(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Price(0);
        }
        Price((value * 100.0).round() as u64)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    /// Nanoseconds since the epoch; saturates outside the representable range.
    pub fn nanos(&self) -> i64 {
        self.0.timestamp_nanos_opt().unwrap_or(i64::MAX)
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

/// One row per end user.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct UserRecord {
    #[n(0)]
    pub id: UserId,
    #[n(1)]
    pub display_name: Option<String>,
    #[n(2)]
    pub region: Option<String>,
    #[n(3)]
    pub verified: bool,
    #[n(4)]
    pub referral_code: Option<String>, // unique, never reassigned
    #[n(5)]
    pub referred_by: Option<UserId>, // set once at creation
    #[n(6)]
    pub referral_count: u32,
}

impl UserRecord {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            display_name: None,
            region: None,
            verified: false,
            referral_code: None,
            referred_by: None,
            referral_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum OrderStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Confirmed,
    #[n(2)]
    Rejected,
}

impl OrderStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

/// Order fields known before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub owner_id: UserId,
    pub product_name: String,
    pub weight: u32,
    pub price: Price,
    pub discount_applied: bool,
    pub payment_proof_ref: String,
}

/// One row per submitted payment proof.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct OrderRecord {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub owner_id: UserId,
    #[n(2)]
    pub product_name: String,
    #[n(3)]
    pub weight: u32, // grams
    #[n(4)]
    pub price: Price, // after discount
    #[n(5)]
    pub discount_applied: bool,
    #[n(6)]
    pub payment_proof_ref: String,
    #[n(7)]
    pub status: OrderStatus,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
    #[n(9)]
    pub status_changed_at: Option<TimeStamp<Utc>>,
}

impl OrderRecord {
    pub fn from_new(id: String, order: NewOrder, created_at: TimeStamp<Utc>) -> Self {
        Self {
            id,
            owner_id: order.owner_id,
            product_name: order.product_name,
            weight: order.weight,
            price: order.price,
            discount_applied: order.discount_applied,
            payment_proof_ref: order.payment_proof_ref,
            status: OrderStatus::Pending,
            created_at,
            status_changed_at: None,
        }
    }
}

impl<C> minicbor::Encode<C> for UserId {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i64(self.0)?.ok()
    }
}
impl<'b, C> minicbor::Decode<'b, C> for UserId {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        d.i64().map(UserId)
    }
}
impl<C> minicbor::Encode<C> for Price {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.u64(self.0)?.ok()
    }
}
impl<'b, C> minicbor::Decode<'b, C> for Price {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        d.u64().map(Price)
    }
}
impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}
impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn order_record_encoding() {
        let order = OrderRecord::from_new(
            "order_test".into(),
            NewOrder {
                owner_id: UserId(-1_001_234),
                product_name: "Gold".into(),
                weight: 10,
                price: Price::from_minor(47_500),
                discount_applied: true,
                payment_proof_ref: "file-1".into(),
            },
            TimeStamp::new(),
        );

        let encoding = minicbor::to_vec(&order).unwrap();
        let decode: OrderRecord = minicbor::decode(&encoding).unwrap();

        assert_eq!(order, decode);
        assert_eq!(decode.status, OrderStatus::Pending);
    }

    #[test]
    fn discount_does_not_overflow_large_prices() {
        let huge = Price::from(f64::MAX);
        assert_eq!(huge.minor(), u64::MAX);

        let expected = (u128::from(u64::MAX) * 95 + 50) / 100;
        assert_eq!(u128::from(huge.discounted(5).minor()), expected);
        assert_eq!(huge.discounted(0), huge);
    }

    #[test]
    fn user_id_key_roundtrip() {
        let id = UserId(987_654_321);
        assert_eq!(UserId::from_key(&id.to_key()), Some(id));
        assert_eq!(UserId::from_key(b"short"), None);
    }
}
