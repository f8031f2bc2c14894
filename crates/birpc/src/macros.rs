//! Typed stubs over `Remote`.

/// Declares a typed view of the peer's interface.
///
/// Each declared function becomes an async method that forwards to
/// [`Remote::call_as`](crate::Remote::call_as). Arguments convert with
/// `Into<Value>`, results with [`FromValue`](crate::FromValue). The wire name
/// defaults to the Rust name and can be overridden with `as "name"`.
///
/// ```
/// birpc::remote_interface! {
///     /// The peer's calculator.
///     pub struct Calculator {
///         fn add(a: i64, b: i64) -> i64;
///         fn last_result() -> Option<i64> as "lastResult";
///     }
/// }
/// ```
#[macro_export]
macro_rules! remote_interface {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                fn $method:ident ( $( $arg:ident : $argty:ty ),* $(,)? )
                    -> $ret:ty $(as $wire:literal)? ;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name {
            remote: $crate::Remote,
        }

        impl $name {
            pub fn new(remote: $crate::Remote) -> Self {
                Self { remote }
            }

            pub fn remote(&self) -> &$crate::Remote {
                &self.remote
            }

            $(
                $(#[$fmeta])*
                pub async fn $method(
                    &self $(, $arg: $argty)*
                ) -> ::std::result::Result<$ret, $crate::CallError> {
                    let args: ::std::vec::Vec<$crate::Value> =
                        ::std::vec![$( $crate::Value::from($arg) ),*];
                    self.remote
                        .call_as::<$ret, _>($crate::__wire_name!($method $(, $wire)?), args)
                        .await
                }
            )*
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __wire_name {
    ($method:ident) => {
        stringify!($method)
    };
    ($method:ident, $wire:literal) => {
        $wire
    };
}
