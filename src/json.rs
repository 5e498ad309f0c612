//! proto3 JSON mapping for the generated messages.
//!
//! `build.rs` walks the compiled descriptors and tags every message field with a serde attribute
//! pointing into this module, so `serde_json` output matches what lnd's REST proxy and `lncli`
//! print:
//!
//! - field names keep their `.proto` spelling; the lowerCamelCase JSON name is accepted on input
//! - 64-bit integers are decimal strings, numbers are still accepted on input
//! - `bytes` are standard base64
//! - enums are their symbolic value names, unknown numbers pass through as numbers
//! - oneof members sit directly on the parent object
//!
//! Each codec exposes `serialize`/`deserialize` for plain fields plus `option`, `repeated` and
//! `map_values` submodules for the other field shapes.

use std::{fmt, marker::PhantomData, str::FromStr};

use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine as _,
};
use serde::{
    de::{self, Unexpected, Visitor},
    Deserializer, Serializer,
};

/// JSON representation of one protobuf scalar type.
pub trait Codec<T> {
    fn serialize<S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error>;
    fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<T, D::Error>;
}

/// Expands to the `serialize`/`deserialize` pair plus the `option`, `repeated` and `map_values`
/// shapes for a [`Codec`].
macro_rules! field_codec {
    ($codec:ty) => {
        pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: ::serde::Serializer,
            $codec: $crate::json::Codec<T>,
        {
            <$codec as $crate::json::Codec<T>>::serialize(value, serializer)
        }

        pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
        where
            D: ::serde::Deserializer<'de>,
            $codec: $crate::json::Codec<T>,
        {
            <$codec as $crate::json::Codec<T>>::deserialize(deserializer)
        }

        pub mod option {
            pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: ::serde::Serializer,
                $codec: $crate::json::Codec<T>,
            {
                $crate::json::shape::serialize_option::<$codec, T, S>(value, serializer)
            }

            pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
            where
                D: ::serde::Deserializer<'de>,
                $codec: $crate::json::Codec<T>,
            {
                $crate::json::shape::deserialize_option::<$codec, T, D>(deserializer)
            }
        }

        pub mod repeated {
            #[allow(clippy::ptr_arg)]
            pub fn serialize<T, S>(values: &Vec<T>, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: ::serde::Serializer,
                $codec: $crate::json::Codec<T>,
            {
                $crate::json::shape::serialize_repeated::<$codec, T, S>(values, serializer)
            }

            pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
            where
                D: ::serde::Deserializer<'de>,
                $codec: $crate::json::Codec<T>,
            {
                $crate::json::shape::deserialize_repeated::<$codec, T, D>(deserializer)
            }
        }

        pub mod map_values {
            use std::collections::HashMap;

            pub fn serialize<K, T, S>(
                map: &HashMap<K, T>,
                serializer: S,
            ) -> Result<S::Ok, S::Error>
            where
                K: ::serde::Serialize,
                S: ::serde::Serializer,
                $codec: $crate::json::Codec<T>,
            {
                $crate::json::shape::serialize_map::<$codec, K, T, S>(map, serializer)
            }

            pub fn deserialize<'de, K, T, D>(deserializer: D) -> Result<HashMap<K, T>, D::Error>
            where
                K: ::serde::Deserialize<'de> + Eq + ::std::hash::Hash,
                D: ::serde::Deserializer<'de>,
                $codec: $crate::json::Codec<T>,
            {
                $crate::json::shape::deserialize_map::<$codec, K, T, D>(deserializer)
            }
        }
    };
}

/// Declares the codec module for one protobuf enum from its `(number, name)` table.
macro_rules! proto_enum {
    ($module:ident, [$(($number:expr, $name:literal)),* $(,)?]) => {
        pub mod $module {
            pub enum Values {}

            impl $crate::json::ProtoEnum for Values {
                const VALUES: &'static [(i32, &'static str)] = &[$(($number, $name)),*];
            }

            field_codec!($crate::json::Enum<$crate::json::enums::$module::Values>);
        }
    };
}

pub(crate) mod shape {
    use std::{collections::HashMap, hash::Hash, marker::PhantomData};

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Codec;

    struct Encode<'a, C, T>(&'a T, PhantomData<C>);

    impl<'a, C, T> Encode<'a, C, T> {
        fn new(value: &'a T) -> Self {
            Encode(value, PhantomData)
        }
    }

    impl<C: Codec<T>, T> Serialize for Encode<'_, C, T> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            C::serialize(self.0, serializer)
        }
    }

    struct Decode<C, T>(T, PhantomData<C>);

    impl<'de, C: Codec<T>, T> Deserialize<'de> for Decode<C, T> {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            C::deserialize(deserializer).map(|value| Decode(value, PhantomData))
        }
    }

    pub(crate) fn serialize_option<C: Codec<T>, T, S: Serializer>(
        value: &Option<T>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&Encode::<C, T>::new(value)),
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn deserialize_option<'de, C: Codec<T>, T, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<T>, D::Error> {
        Ok(Option::<Decode<C, T>>::deserialize(deserializer)?.map(|decoded| decoded.0))
    }

    pub(crate) fn serialize_repeated<C: Codec<T>, T, S: Serializer>(
        values: &[T],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(Encode::<C, T>::new))
    }

    pub(crate) fn deserialize_repeated<'de, C: Codec<T>, T, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<T>, D::Error> {
        let decoded = Vec::<Decode<C, T>>::deserialize(deserializer)?;
        Ok(decoded.into_iter().map(|decoded| decoded.0).collect())
    }

    pub(crate) fn serialize_map<C: Codec<T>, K: Serialize, T, S: Serializer>(
        map: &HashMap<K, T>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(map.iter().map(|(key, value)| (key, Encode::<C, T>::new(value))))
    }

    pub(crate) fn deserialize_map<'de, C, K, T, D>(
        deserializer: D,
    ) -> Result<HashMap<K, T>, D::Error>
    where
        C: Codec<T>,
        K: Deserialize<'de> + Eq + Hash,
        D: Deserializer<'de>,
    {
        let decoded = HashMap::<K, Decode<C, T>>::deserialize(deserializer)?;
        Ok(decoded.into_iter().map(|(key, decoded)| (key, decoded.0)).collect())
    }
}

/// `int64`, `uint64` and their fixed/zigzag variants: decimal strings, since JSON numbers lose
/// precision past 2^53.
pub struct Int64;

pub trait Integer: Copy + fmt::Display + FromStr + TryFrom<i64> + TryFrom<u64> {}

impl Integer for i64 {}
impl Integer for u64 {}

impl<T: Integer> Codec<T> for Int64 {
    fn serialize<S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<T, D::Error> {
        deserializer.deserialize_any(IntegerVisitor(PhantomData))
    }
}

struct IntegerVisitor<T>(PhantomData<T>);

impl<T: Integer> Visitor<'_> for IntegerVisitor<T> {
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a 64-bit integer or its decimal string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<T, E> {
        <T as TryFrom<i64>>::try_from(v)
            .map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<T, E> {
        <T as TryFrom<u64>>::try_from(v)
            .map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<T, E> {
        if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
            return self.visit_i64(v as i64);
        }
        Err(E::invalid_value(Unexpected::Float(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<T, E> {
        v.parse().map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

/// `bytes`: standard base64 with padding on output; URL-safe and unpadded input is accepted.
pub struct Base64;

impl Codec<Vec<u8>> for Base64 {
    fn serialize<S: Serializer>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        deserializer.deserialize_str(Base64Visitor)
    }
}

struct Base64Visitor;

impl Visitor<'_> for Base64Visitor {
    type Value = Vec<u8>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a base64 string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Vec<u8>, E> {
        [&STANDARD, &URL_SAFE, &STANDARD_NO_PAD, &URL_SAFE_NO_PAD]
            .into_iter()
            .find_map(|engine| engine.decode(v).ok())
            .ok_or_else(|| E::invalid_value(Unexpected::Str(v), &self))
    }
}

/// Value table of one protobuf enum, generated from its descriptor.
pub trait ProtoEnum {
    const VALUES: &'static [(i32, &'static str)];
}

/// Enum fields are `i32` in prost; this maps them to and from the symbolic names of `E`.
pub struct Enum<E>(PhantomData<E>);

impl<E: ProtoEnum> Codec<i32> for Enum<E> {
    fn serialize<S: Serializer>(value: &i32, serializer: S) -> Result<S::Ok, S::Error> {
        match E::VALUES.iter().find(|(number, _)| number == value) {
            Some((_, name)) => serializer.serialize_str(name),
            None => serializer.serialize_i32(*value),
        }
    }

    fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
        deserializer.deserialize_any(EnumVisitor::<E>(PhantomData))
    }
}

struct EnumVisitor<E>(PhantomData<E>);

impl<E: ProtoEnum> Visitor<'_> for EnumVisitor<E> {
    type Value = i32;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an enum value name or number")
    }

    fn visit_i64<E2: de::Error>(self, v: i64) -> Result<i32, E2> {
        i32::try_from(v).map_err(|_| E2::invalid_value(Unexpected::Signed(v), &self))
    }

    fn visit_u64<E2: de::Error>(self, v: u64) -> Result<i32, E2> {
        i32::try_from(v).map_err(|_| E2::invalid_value(Unexpected::Unsigned(v), &self))
    }

    fn visit_str<E2: de::Error>(self, v: &str) -> Result<i32, E2> {
        E::VALUES
            .iter()
            .find(|(_, name)| *name == v)
            .map(|(number, _)| *number)
            .ok_or_else(|| E2::invalid_value(Unexpected::Str(v), &self))
    }
}

pub mod int64 {
    field_codec!(crate::json::Int64);
}

pub mod bytes {
    field_codec!(crate::json::Base64);
}

/// One codec module per enum in the bundled protos, named after its fully qualified proto name.
pub mod enums {
    include!(concat!(env!("OUT_DIR"), "/json_enums.rs"));
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::proto::{chainrpc, lnrpc, walletrpc};

    #[test]
    fn enum_fields_use_value_names() {
        let request = lnrpc::NewAddressRequest {
            r#type: lnrpc::AddressType::TaprootPubkey as i32,
            account: String::new(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({ "type": "TAPROOT_PUBKEY", "account": "" }));

        let back: lnrpc::NewAddressRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn nested_and_foreign_package_enums_use_their_own_tables() {
        let request = walletrpc::AddrRequest {
            account: "default".to_string(),
            r#type: walletrpc::AddressType::TaprootPubkey as i32,
            change: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "TAPROOT_PUBKEY");

        let payment = lnrpc::Payment {
            status: lnrpc::payment::PaymentStatus::Succeeded as i32,
            ..Default::default()
        };
        let value = serde_json::to_value(&payment).unwrap();
        assert_eq!(value["status"], "SUCCEEDED");
    }

    #[test]
    fn unknown_enum_numbers_pass_through() {
        let request = lnrpc::NewAddressRequest { r#type: 42, account: String::new() };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], 42);

        let back: lnrpc::NewAddressRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back.r#type, 42);
    }

    #[test]
    fn int64_fields_are_decimal_strings() {
        let balance = lnrpc::WalletBalanceResponse {
            confirmed_balance: 9_007_199_254_740_993,
            ..Default::default()
        };
        let value = serde_json::to_value(&balance).unwrap();
        assert_eq!(value["confirmed_balance"], "9007199254740993");
        assert_eq!(value["total_balance"], "0");

        let back: lnrpc::WalletBalanceResponse = serde_json::from_value(value).unwrap();
        assert_eq!(back.confirmed_balance, 9_007_199_254_740_993);
    }

    #[test]
    fn int64_input_accepts_numbers_and_camel_case_names() {
        let balance: lnrpc::WalletBalanceResponse = serde_json::from_value(json!({
            "totalBalance": 12,
            "confirmed_balance": "-3",
        }))
        .unwrap();
        assert_eq!(balance.total_balance, 12);
        assert_eq!(balance.confirmed_balance, -3);
        assert_eq!(balance.unconfirmed_balance, 0);

        let err = serde_json::from_value::<lnrpc::WalletBalanceResponse>(json!({
            "total_balance": "twelve",
        }));
        assert!(err.is_err());
    }

    #[test]
    fn map_values_and_keys_follow_the_mapping() {
        let mut request = lnrpc::SendManyRequest::default();
        request.addr_to_amount.insert("bc1qexample".to_string(), 21_000);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["AddrToAmount"], json!({ "bc1qexample": "21000" }));

        let mut route = lnrpc::QueryRoutesRequest::default();
        route.dest_custom_records.insert(65_536, vec![0xde, 0xad]);
        let value = serde_json::to_value(&route).unwrap();
        assert_eq!(value["dest_custom_records"], json!({ "65536": "3q0=" }));

        let back: lnrpc::QueryRoutesRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back.dest_custom_records[&65_536], vec![0xde, 0xad]);
    }

    #[test]
    fn bytes_are_base64() {
        let outpoint = chainrpc::Outpoint { hash: vec![0xde, 0xad], index: 1 };
        let value = serde_json::to_value(&outpoint).unwrap();
        assert_eq!(value, json!({ "hash": "3q0=", "index": 1 }));

        let unpadded: chainrpc::Outpoint =
            serde_json::from_value(json!({ "hash": "3q0", "index": 1 })).unwrap();
        assert_eq!(unpadded, outpoint);
    }

    #[test]
    fn oneof_members_sit_on_the_parent_object() {
        let point = lnrpc::ChannelPoint {
            funding_txid: Some(lnrpc::channel_point::FundingTxid::FundingTxidStr(
                "ab".repeat(32),
            )),
            output_index: 1,
        };
        let value = serde_json::to_value(&point).unwrap();
        assert_eq!(value, json!({ "funding_txid_str": "ab".repeat(32), "output_index": 1 }));

        let back: lnrpc::ChannelPoint = serde_json::from_value(value).unwrap();
        assert_eq!(back, point);

        let bare: lnrpc::ChannelPoint =
            serde_json::from_value(json!({ "output_index": 2 })).unwrap();
        assert_eq!(bare.funding_txid, None);
    }

    #[test]
    fn missing_fields_take_proto_defaults() {
        let info: lnrpc::GetInfoResponse = serde_json::from_value(json!({
            "alias": "alice",
            "block_height": 800_000,
        }))
        .unwrap();
        assert_eq!(info.alias, "alice");
        assert_eq!(info.block_height, 800_000);
        assert!(info.chains.is_empty());
    }
}
