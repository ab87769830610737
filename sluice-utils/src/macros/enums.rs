#[doc(hidden)]
#[macro_export]
/// A macro which defines a byte-backed wire enum.
///
/// Every declared variant maps to a single `u8`, any other value
/// is preserved as `Unknown(u8)` so parsers never lose information.
macro_rules! __enum_builder {
    (
        $(#[$m:meta])*
        @U8
        $enum_vis:vis enum $enum_name:ident
        { $( $(#[$enum_meta:meta])* $enum_var:ident => $enum_val:expr ),* $(,)? }
    ) => {
        $(#[$m])*
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
        $enum_vis enum $enum_name {
            $(
                $(#[$enum_meta])*
                $enum_var
            ),*
            ,Unknown(u8)
        }

        impl From<u8> for $enum_name {
            fn from(x: u8) -> Self {
                match x {
                    $($enum_val => $enum_name::$enum_var),*
                    , x => $enum_name::Unknown(x),
                }
            }
        }

        impl From<$enum_name> for u8 {
            fn from(value: $enum_name) -> Self {
                match value {
                    $( $enum_name::$enum_var => $enum_val),*
                    ,$enum_name::Unknown(x) => x
                }
            }
        }

        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $( $enum_name::$enum_var => write!(f, concat!(stringify!($enum_var), " ({:#04x})"), $enum_val)),*
                    ,$enum_name::Unknown(x) => write!(f, "Unknown ({x:#04x})"),
                }
            }
        }

        impl ::std::fmt::LowerHex for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::LowerHex::fmt(&u8::from(*self), f)
            }
        }

        impl $crate::macros::enums::__SerdeSerialize for $enum_name {
            #[inline]
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: $crate::macros::enums::__SerdeSerializer,
            {
                $crate::macros::enums::__SerdeSerialize::serialize(&u8::from(*self), serializer)
            }
        }

        impl<'de> $crate::macros::enums::__SerdeDeserialize<'de> for $enum_name {
            #[inline]
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: $crate::macros::enums::__SerdeDeserializer<'de>,
            {
                let n = <u8 as $crate::macros::enums::__SerdeDeserialize<'de>>::deserialize(deserializer)?;
                Ok(n.into())
            }
        }
    };
}

#[doc(inline)]
pub use crate::__enum_builder as enum_builder;

#[doc(hidden)]
pub use serde::{
    Deserialize as __SerdeDeserialize, Deserializer as __SerdeDeserializer,
    Serialize as __SerdeSerialize, Serializer as __SerdeSerializer,
};

#[cfg(test)]
mod tests {
    use super::*;

    enum_builder! {
        @U8
        enum Signal {
            Go => 0x5A,
            Stop => 0x5B,
        }
    }

    #[test]
    fn u8_enum_known_and_unknown() {
        assert_eq!(Signal::from(0x5A), Signal::Go);
        assert_eq!(Signal::from(0x01), Signal::Unknown(0x01));
        assert_eq!(u8::from(Signal::Stop), 0x5B);
        assert_eq!(u8::from(Signal::Unknown(7)), 7);
    }

    #[test]
    fn u8_enum_display() {
        assert_eq!(Signal::Go.to_string(), "Go (0x5a)");
        assert_eq!(Signal::Unknown(0xff).to_string(), "Unknown (0xff)");
        assert_eq!(format!("{:x}", Signal::Stop), "5b");
    }

    #[test]
    fn u8_enum_serde() {
        let s = serde_json::to_string(&Signal::Go).unwrap();
        assert_eq!(s, "90");
        let v: Signal = serde_json::from_str("91").unwrap();
        assert_eq!(v, Signal::Stop);
    }
}
