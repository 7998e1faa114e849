//! Declarative macros for ergonomic effect construction
//!
//! These macros reduce boilerplate when creating `Effect` variants from reducers.

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use ticketmint_core::async_effect;
///
/// async_effect! {
///     let outcome = backend.mint(request).await;
///     Some(PurchaseAction::MintFinished { outcome })
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use ticketmint_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(30),
///     action: PurchaseAction::TimedOut { attempt: 1 }
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

/// Create an `Effect::Future` that awaits a fallible call and maps both outcomes
/// to actions.
///
/// # Example
///
/// ```rust,ignore
/// use ticketmint_core::call_effect;
///
/// call_effect! {
///     call: backend.cancel_listing(nft, token_id),
///     on_success: |_| Some(ListingAction::Cancelled),
///     on_error: |error| Some(ListingAction::Failed { message: error.to_string() })
/// }
/// ```
#[macro_export]
macro_rules! call_effect {
    (
        call: $call:expr,
        on_success: |$success_param:pat_param| $success_body:expr,
        on_error: |$error_param:ident| $error_body:expr
    ) => {
        $crate::effect::Effect::Future(::std::boxed::Box::pin(async move {
            match $call.await {
                Ok($success_param) => $success_body,
                Err($error_param) => $error_body,
            }
        }))
    };
}
