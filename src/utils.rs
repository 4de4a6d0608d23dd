use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serializer;

/// ISO-8601 UTC with millisecond precision, e.g. `2016-02-18T03:22:56.637Z`.
pub fn serialize_date<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = date.to_rfc3339_opts(SecondsFormat::Millis, true);
    serializer.serialize_str(&s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Stamp {
        #[serde(serialize_with = "serialize_date")]
        at: DateTime<Utc>,
    }

    #[test]
    fn dates_render_with_millis_and_zulu() {
        let at = Utc.with_ymd_and_hms(2016, 2, 18, 3, 22, 56).unwrap()
            + chrono::Duration::milliseconds(637);
        let json = serde_json::to_string(&Stamp { at }).unwrap();
        assert_eq!(json, r#"{"at":"2016-02-18T03:22:56.637Z"}"#);
    }
}
