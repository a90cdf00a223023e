use time::{
    OffsetDateTime, PrimitiveDateTime, UtcDateTime, UtcOffset,
    format_description::{BorrowedFormatItem as I, Component as C, modifier},
};

use crate::{
    Decode, DecodeError, Encode,
    encode::{EncodeError, Encoded},
    postgres::{Oid, PgType},
    row::Column,
};

impl PgType for PrimitiveDateTime {
    /// date and time
    const OID: Oid = 1114;
}

impl PgType for UtcDateTime {
    /// date and time with timezone
    const OID: Oid = 1184;
}

const FRACTION: I<'_> = I::Optional(&I::Compound(&[
    I::Literal(b"."),
    I::Component(C::Subsecond(modifier::Subsecond::default())),
]));

const TIMESTAMP: &[I<'_>] = &[
    I::Component(C::Year(modifier::Year::default())),
    I::Literal(b"-"),
    I::Component(C::Month(modifier::Month::default())),
    I::Literal(b"-"),
    I::Component(C::Day(modifier::Day::default())),
    I::Literal(b" "),
    I::Component(C::Hour(modifier::Hour::default())),
    I::Literal(b":"),
    I::Component(C::Minute(modifier::Minute::default())),
    I::Literal(b":"),
    I::Component(C::Second(modifier::Second::default())),
    FRACTION,
];

// Postgres prints the UTC offset with as little precision as the offset
// itself needs: `+02`, `+05:30`, or (rare) `+05:30:45`.
const TIMESTAMPTZ: &[I<'_>] = &[
    I::Component(C::Year(modifier::Year::default())),
    I::Literal(b"-"),
    I::Component(C::Month(modifier::Month::default())),
    I::Literal(b"-"),
    I::Component(C::Day(modifier::Day::default())),
    I::Literal(b" "),
    I::Component(C::Hour(modifier::Hour::default())),
    I::Literal(b":"),
    I::Component(C::Minute(modifier::Minute::default())),
    I::Literal(b":"),
    I::Component(C::Second(modifier::Second::default())),
    FRACTION,
    I::First(&[
        I::Compound(&[
            I::Component(C::OffsetHour(modifier::OffsetHour::default())),
            I::Literal(b":"),
            I::Component(C::OffsetMinute(modifier::OffsetMinute::default())),
            I::Literal(b":"),
            I::Component(C::OffsetSecond(modifier::OffsetSecond::default())),
        ]),
        I::Compound(&[
            I::Component(C::OffsetHour(modifier::OffsetHour::default())),
            I::Literal(b":"),
            I::Component(C::OffsetMinute(modifier::OffsetMinute::default())),
        ]),
        I::Compound(&[I::Component(C::OffsetHour(modifier::OffsetHour::default()))]),
    ]),
];

impl Decode for PrimitiveDateTime {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        let s = std::str::from_utf8(&value)?;
        PrimitiveDateTime::parse(s, TIMESTAMP)
            .map_err(|_| DecodeError::Invalid(format!("invalid timestamp value: {s:?}").into()))
    }
}

impl Decode for UtcDateTime {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        let s = std::str::from_utf8(&value)?;
        let odt = OffsetDateTime::parse(s, TIMESTAMPTZ)
            .map_err(|_| DecodeError::Invalid(format!("invalid timestamptz value: {s:?}").into()))?
            .to_offset(UtcOffset::UTC);
        Ok(UtcDateTime::new(odt.date(), odt.time()))
    }
}

impl Encode<'static> for PrimitiveDateTime {
    fn encode(self) -> Result<Encoded<'static>, EncodeError> {
        let bytes = self.format(&DESCRIPTION)
            .map_err(|e| EncodeError::new(e.to_string()))?;
        Ok(Encoded::owned(bytes, Self::OID))
    }
}

impl Encode<'static> for UtcDateTime {
    fn encode(self) -> Result<Encoded<'static>, EncodeError> {
        let mut bytes = self.format(&DESCRIPTION)
            .map_err(|e| EncodeError::new(e.to_string()))?;
        // `DESCRIPTION` carries no offset component; `UtcDateTime` is always
        // UTC, so make that explicit rather than let the server assume the
        // session timezone.
        bytes.extend_from_slice(b"+00");
        Ok(Encoded::owned(bytes, Self::OID))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::row::Column;
    use time::macros::{date, datetime};

    fn column(oid: Oid, bytes: &'static [u8]) -> Column {
        Column::new_for_test(oid, Some(bytes::Bytes::from_static(bytes)))
    }

    fn column_owned(oid: Oid, bytes: Vec<u8>) -> Column {
        Column::new_for_test(oid, Some(bytes::Bytes::from(bytes)))
    }

    #[test]
    fn decodes_timestamp_without_fraction() {
        let got = PrimitiveDateTime::decode(column(PrimitiveDateTime::OID, b"2001-02-03 04:05:06")).unwrap();
        assert_eq!(got, datetime!(2001-02-03 04:05:06));
    }

    #[test]
    fn decodes_timestamp_with_fraction() {
        let got = PrimitiveDateTime::decode(column(PrimitiveDateTime::OID, b"2001-02-03 04:05:06.123")).unwrap();
        assert_eq!(got.date(), date!(2001 - 02 - 03));
        assert_eq!(got.time().millisecond(), 123);
    }

    #[test]
    fn decodes_timestamptz_with_negative_offset() {
        let got = UtcDateTime::decode(column(UtcDateTime::OID, b"2001-02-03 04:05:06.123-07")).unwrap();
        // -07 offset means the instant is 11:05:06.123 UTC.
        assert_eq!(got.date(), date!(2001 - 02 - 03));
        assert_eq!(got.hour(), 11);
        assert_eq!(got.minute(), 5);
    }

    #[test]
    fn round_trips_primitive_datetime_through_encode_and_decode() {
        use bytes::Buf;

        let original = datetime!(2024-06-15 12:30:00.500);
        let mut encoded = original.encode().unwrap();
        let bytes = encoded.chunk().to_vec();
        encoded.advance(bytes.len());

        let got = PrimitiveDateTime::decode(column_owned(PrimitiveDateTime::OID, bytes)).unwrap();
        assert_eq!(got, original);
    }
}

const DESCRIPTION: &[I<'_>] = &[
    I::Component(C::Year(modifier::Year::default())),
    I::Literal(b"-"),
    I::Component(C::Month(modifier::Month::default())),
    I::Literal(b"-"),
    I::Component(C::Day(modifier::Day::default())),
    I::Literal(b" "),
    I::Component(C::Hour(modifier::Hour::default())),
    I::Literal(b":"),
    I::Component(C::Minute(modifier::Minute::default())),
    I::Literal(b":"),
    I::Component(C::Second(modifier::Second::default())),
    I::Literal(b"."),
    I::Component(C::Subsecond(modifier::Subsecond::default())),
];
