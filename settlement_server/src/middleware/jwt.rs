//! JWT authentication middleware for the settlement server.
//!
//! Every route under the `/api` scope is wrapped with this middleware. It expects an
//! `Authorization: Bearer <token>` header carrying a token issued by the `/auth` endpoint,
//! validates the signature and expiry, and stores the decoded [`JwtClaims`] in the request
//! extensions where handlers and the ACL middleware can pick them up.
//!
//! A missing or invalid token short-circuits the request with a 401 response. Role checks are
//! not done here; that is the ACL middleware's job.

use std::{pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
    HttpMessage,
};
use futures::{
    future::{ok, Ready},
    Future,
};
use log::debug;

use crate::{
    auth::{extract_bearer_token, TokenIssuer},
    errors::{AuthError, ServerError},
};

pub struct JwtMiddlewareFactory {
    issuer: TokenIssuer,
}

impl JwtMiddlewareFactory {
    pub fn new(issuer: TokenIssuer) -> Self {
        JwtMiddlewareFactory { issuer }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = JwtMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(JwtMiddlewareService { issuer: self.issuer.clone(), service: Rc::new(service) })
    }
}

pub struct JwtMiddlewareService<S> {
    issuer: TokenIssuer,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let issuer = self.issuer.clone();
        Box::pin(async move {
            let token =
                extract_bearer_token(req.request()).ok_or(ServerError::AuthenticationError(AuthError::MissingToken))?;
            let claims = issuer.validate_token(&token).map_err(ServerError::AuthenticationError)?;
            debug!("🔑️ Authenticated request from {} with roles {:?}", claims.sub, claims.roles);
            req.extensions_mut().insert(claims);
            service.call(req).await
        })
    }
}
