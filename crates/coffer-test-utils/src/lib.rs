// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Test utilities shared between the Coffer crates.

/// A result type useful in tests, that wraps any error implementation.
pub type Result<T = ()> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Macro for creating parametrized *synchronous* tests.
///
/// The `param_test!` macro accepts the name of an existing function, followed by a list of case
/// names and their arguments. It expands to a module with a `#[test]` function for each of the
/// cases. Each test case calls the existing, named function with their provided arguments.
///
/// See [`async_param_test`] for a similar macro that works with `async` functions.
///
/// # Examples
///
/// ```
/// # use coffer_test_utils::param_test;
/// #
/// param_test! {
///     normalizes_page: [
///         zero_page: (0, 1),
///         negative_page: (-7, 1),
///     ]
/// }
/// fn normalizes_page(page: i32, expected: i32) {
///     assert_eq!(page.max(1), expected);
/// }
/// ```
///
/// Test functions can also have return types, such as a [`Result`], and attributes such as
/// `#[ignore]` may be added to individual cases:
///
/// ```
/// # use std::error::Error;
/// # use coffer_test_utils::param_test;
/// #
/// param_test! {
///     parses_tenant -> Result<(), Box<dyn Error>>: [
///         #[ignore] zero: ("0", 0),
///         nonzero: ("17", 17),
///     ]
/// }
/// fn parses_tenant(to_parse: &str, expected: u32) -> Result<(), Box<dyn Error>> {
///     assert_eq!(expected, to_parse.parse::<u32>()?);
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! param_test {
    ($func_name:ident -> $return_ty:ty: [
        $( $(#[$outer:meta])* $case_name:ident:
            $(<$($type_args:ty),+>)?( $($args:expr),* $(,)? ) ),+$(,)?
    ]) => {
        mod $func_name {
            use super::*;

            $(
                #[test]
                $(#[$outer])*
                fn $case_name() -> $return_ty {
                    $func_name$(::<$($type_args),+>)?($($args),*)
                }
            )*
        }
    };
    ($func_name:ident: [
        $( $(#[$outer:meta])* $case_name:ident:
            $(<$($type_args:ty),+>)?( $($args:expr),* $(,)? ) ),+$(,)?
    ]) => {
        $crate::param_test!(
            $func_name -> ():
            [ $( $(#[$outer])* $case_name: $(<$($type_args),+>)?( $($args),* ) ),+ ]
        );
    };
}

/// Macro for creating parametrized *asynchronous* tests.
///
/// This macro behaves similarly to the [`param_test`] macro, however it must be used with an
/// `async` function. For convenience, the macro expands the test cases with the `#[tokio::test]`
/// attribute; attributes placed before the function name are applied to all cases instead.
#[macro_export]
macro_rules! async_param_test {
    // Macro uses 'internal rules' to avoid any difficulty with imports. Additionally, we use
    // 'TT Bundling' to pass parameters through multiple calls as a single unit.
    //
    // See https://danielkeep.github.io/tlborm/book/README.html for more information.
    (@expand_return_type ()) => { () };
    (@expand_return_type ($return_type:ty)) => { $return_type };
    (@merge_attributes (), (), $body:tt) => {
        async_param_test!(@expand_test_case (#[tokio::test]), $body);
    };
    (@merge_attributes (), ($(#[$case:meta])+), $body:tt) => {
        async_param_test!(@expand_test_case ($(#[$case])+), $body);
    };
    (@merge_attributes ($(#[$outer:meta])+), ($(#[$case:meta])*), $body:tt) => {
        async_param_test!(@expand_test_case ($(#[$outer])+ $(#[$case])*), $body);
    };
    (@expand_test_case ($(#[$outer:meta])*), ($($body:tt)+)) => { $(#[$outer])* $($body)+ };
    (@group_inputs $shared_meta:tt, $func_name:ident, $return_group:tt, [
        $($(#[$case_meta:meta])* $case_name:ident: ($($args:expr),+)),+$(,)?
    ]) => {
        mod $func_name {
            use super::*;

            $(
                async_param_test!{
                    @merge_attributes $shared_meta, ($(#[$case_meta])*),
                    (
                        async fn $case_name() -> async_param_test!(
                            @expand_return_type $return_group
                        ) {
                            $func_name($($args),+).await
                        }
                    )
                }
            )*
        }
    };
    ($(#[$outer:meta])* $func_name:ident $(-> $return_ty:ty)?: $cases:tt) => {
        async_param_test!(
            @group_inputs ($(#[$outer])*), $func_name, ($($return_ty)?), $cases
        );
    };
}
