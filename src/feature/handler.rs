//! Features and their handlers.
//!
//! A [`Feature`] pairs an action name with its request and confirmation types
//! and, for actions this side answers, a [`Handler`]. Payload decoding and
//! validation happen inside [`TypedHandler`] so that a bad payload becomes the
//! right CallError code before any application code runs.

use std::any::{Any, TypeId};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use super::CallContext;
use crate::codec::JsonCodec;
use crate::error::{OcppError, Result};
use crate::model::{Confirmation, Request, Validate};
use crate::protocol::{CallFailure, ErrorCode};

/// Result type for handler functions.
pub type HandlerResult = std::result::Result<Value, CallFailure>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A decoded confirmation whose concrete type is known only to the caller.
pub type AnyConfirmation = Box<dyn Any + Send>;

/// Decodes a CallResult payload into the feature's confirmation type.
type ConfirmationDecoder = fn(Value) -> Result<AnyConfirmation>;

/// Trait for handler functions.
pub trait Handler: Send + Sync + 'static {
    /// Handle an incoming call with its raw payload.
    fn call(&self, payload: Value, ctx: CallContext) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper that decodes and validates the payload before calling the handler.
pub struct TypedHandler<R, F, Fut>
where
    R: Request,
    F: Fn(R, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R::Confirmation, CallFailure>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(R) -> Fut>,
}

impl<R, F, Fut> TypedHandler<R, F, Fut>
where
    R: Request,
    F: Fn(R, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R::Confirmation, CallFailure>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<R, F, Fut> Handler for TypedHandler<R, F, Fut>
where
    R: Request,
    F: Fn(R, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R::Confirmation, CallFailure>> + Send + 'static,
{
    fn call(&self, payload: Value, ctx: CallContext) -> BoxFuture<'static, HandlerResult> {
        let request: R = match JsonCodec::unpack(payload) {
            Ok(r) => r,
            Err(e) => {
                let failure = CallFailure::new(ErrorCode::FormationViolation, e.to_string());
                return Box::pin(async move { Err(failure) });
            }
        };

        if let Err(e) = request.validate() {
            let failure = CallFailure::new(ErrorCode::PropertyConstraintViolation, e.to_string());
            return Box::pin(async move { Err(failure) });
        }

        let fut = (self.handler)(request, ctx);
        Box::pin(async move {
            let confirmation = fut.await?;
            JsonCodec::pack(&confirmation)
                .map_err(|e| CallFailure::internal(format!("confirmation not serializable: {}", e)))
        })
    }
}

fn decode_confirmation<C: Confirmation>(payload: Value) -> Result<AnyConfirmation> {
    let confirmation: C = JsonCodec::unpack(payload)?;
    confirmation
        .validate()
        .map_err(|e| OcppError::Protocol(format!("invalid confirmation: {}", e)))?;
    Ok(Box::new(confirmation))
}

/// One supported RPC operation.
#[derive(Clone)]
pub struct Feature {
    action: &'static str,
    request_type: TypeId,
    request_name: &'static str,
    confirmation_type: TypeId,
    confirmation_name: &'static str,
    decoder: ConfirmationDecoder,
    handler: Option<Arc<dyn Handler>>,
}

impl Feature {
    /// A feature this side only sends. Incoming calls for it are answered
    /// with `NotSupported`.
    pub fn outgoing<R: Request>() -> Self {
        Self {
            action: R::ACTION,
            request_type: TypeId::of::<R>(),
            request_name: std::any::type_name::<R>(),
            confirmation_type: TypeId::of::<R::Confirmation>(),
            confirmation_name: std::any::type_name::<R::Confirmation>(),
            decoder: decode_confirmation::<R::Confirmation>,
            handler: None,
        }
    }

    /// A feature this side answers with `handler`. It can still be sent.
    pub fn handled<R, F, Fut>(handler: F) -> Self
    where
        R: Request,
        F: Fn(R, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R::Confirmation, CallFailure>> + Send + 'static,
    {
        Self {
            handler: Some(Arc::new(TypedHandler::new(handler))),
            ..Self::outgoing::<R>()
        }
    }

    /// Action name on the wire.
    #[inline]
    pub fn action(&self) -> &'static str {
        self.action
    }

    /// Type id of the request payload.
    #[inline]
    pub fn request_type(&self) -> TypeId {
        self.request_type
    }

    /// Type id of the confirmation payload.
    #[inline]
    pub fn confirmation_type(&self) -> TypeId {
        self.confirmation_type
    }

    /// Rust type name of the request, for diagnostics.
    pub fn request_name(&self) -> &'static str {
        self.request_name
    }

    /// Rust type name of the confirmation, for diagnostics.
    pub fn confirmation_name(&self) -> &'static str {
        self.confirmation_name
    }

    /// Handler for incoming calls, if this side answers the action.
    pub fn handler(&self) -> Option<&Arc<dyn Handler>> {
        self.handler.as_ref()
    }

    /// Decode a CallResult payload into this feature's confirmation type.
    pub fn decode_confirmation(&self, payload: Value) -> Result<AnyConfirmation> {
        (self.decoder)(payload)
    }
}

impl std::fmt::Debug for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feature")
            .field("action", &self.action)
            .field("request", &self.request_name)
            .field("confirmation", &self.confirmation_name)
            .field("handled", &self.handler.is_some())
            .finish()
    }
}
