//! `#[window_test::paused_test]` runs an async test on a current-thread Tokio
//! runtime whose clock starts paused, so poll loops and fetch timeouts advance
//! in virtual time. A watchdog thread still fails the test if it does not
//! finish within a real-time budget (default 30 seconds).
//!
//! ```ignore
//! #[window_test::paused_test]
//! async fn jump_polls_until_rendered() { /* ... */ }
//!
//! #[window_test::paused_test(5)]
//! async fn with_a_tighter_budget() { /* ... */ }
//! ```
//!
//! The crate using the attribute needs `tokio` with the `rt`, `time` and
//! `test-util` features.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, ItemFn, LitInt};

const DEFAULT_BUDGET_SECS: u64 = 30;

#[proc_macro_attribute]
pub fn paused_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut budget_secs = DEFAULT_BUDGET_SECS;

    if !attr.is_empty() {
        let lit = parse_macro_input!(attr as LitInt);
        budget_secs = match lit.base10_parse::<u64>() {
            Ok(0) => {
                return syn::Error::new_spanned(&lit, "budget must be greater than zero")
                    .to_compile_error()
                    .into()
            }
            Ok(secs) => secs,
            Err(err) => return err.to_compile_error().into(),
        };
    }

    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(&sig.ident, "paused_test expects an async fn")
            .to_compile_error()
            .into();
    }
    if !sig.inputs.is_empty() {
        return syn::Error::new_spanned(&sig.inputs, "paused_test functions take no arguments")
            .to_compile_error()
            .into();
    }

    sig.asyncness = None;
    let name = sig.ident.to_string();

    let attrs: Vec<Attribute> = attrs
        .into_iter()
        .filter(|attr| !is_test_attribute(attr))
        .collect();

    TokenStream::from(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let budget = std::time::Duration::from_secs(#budget_secs);
            let (sender, receiver) = std::sync::mpsc::channel();
            std::thread::Builder::new()
                .name(#name.to_string())
                .spawn(move || {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        let runtime = tokio::runtime::Builder::new_current_thread()
                            .enable_time()
                            .start_paused(true)
                            .build()
                            .expect("failed to build paused Tokio runtime");
                        runtime.block_on(async move #block);
                    }));
                    let _ = sender.send(result);
                })
                .expect("failed to spawn test thread");
            match receiver.recv_timeout(budget) {
                Ok(Ok(())) => {}
                Ok(Err(payload)) => std::panic::resume_unwind(payload),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    panic!("{} exceeded its {:?} wall-clock budget", #name, budget)
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("{} test thread exited without reporting", #name)
                }
            }
        }
    })
}

/// Drops `#[test]` and `#[tokio::test]` so the generated `#[test]` is the only one.
fn is_test_attribute(attr: &Attribute) -> bool {
    let segments: Vec<String> = attr
        .path()
        .segments
        .iter()
        .map(|segment| segment.ident.to_string())
        .collect();
    matches!(
        segments.iter().map(String::as_str).collect::<Vec<_>>().as_slice(),
        ["test"] | ["tokio", "test"]
    )
}
