// src/models/mod.rs

pub mod class_result;
pub mod notice;
pub mod question;
pub mod quiz;
pub mod result;

/// Deserializers that normalize the timestamp shapes found in stored records.
///
/// Records carry epoch milliseconds, but older documents hold the store's
/// native `{seconds, nanoseconds}` timestamps (sometimes underscore-prefixed)
/// or fractional milliseconds. All of them come out as `i64` epoch millis.
pub mod timestamp {
    use serde::{Deserialize, Deserializer};

    use crate::store::ServerTimestamp;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Fractional(f64),
        Server(ServerTimestamp),
    }

    impl RawTimestamp {
        fn into_millis(self) -> i64 {
            match self {
                RawTimestamp::Millis(ms) => ms,
                RawTimestamp::Fractional(ms) => ms.round() as i64,
                RawTimestamp::Server(ts) => ts.to_epoch_millis(),
            }
        }
    }

    pub fn required<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawTimestamp::deserialize(deserializer).map(RawTimestamp::into_millis)
    }

    pub fn optional<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<RawTimestamp>::deserialize(deserializer)?.map(RawTimestamp::into_millis))
    }

}
