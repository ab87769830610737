#[doc(hidden)]
#[macro_export]
macro_rules! __static_str_error {
    (
        $(#[$m:meta])*
        $vis:vis struct $name:ident = $desc:literal;
    ) => {
        $(#[$m])*
        #[derive(Debug, Default, Clone, PartialEq, Eq)]
        #[non_exhaustive]
        #[doc = $desc]
        $vis struct $name;

        impl $name {
            #[doc = concat!("Create a new ", stringify!($name), ".")]
            #[must_use]
            $vis fn new() -> Self {
                Self::default()
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($desc)
            }
        }

        impl ::std::error::Error for $name {}
    };
}
#[doc(inline)]
pub use crate::__static_str_error as static_str_error;

#[cfg(test)]
mod tests {
    use super::*;

    static_str_error! {
        struct GateClosed = "gate closed";
    }

    #[test]
    fn static_str_error_display() {
        let err = GateClosed::new();
        assert_eq!(err.to_string(), "gate closed");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }
}
