//! Access control list middleware for the food court server.
//! This middleware can be placed on any route or service.
//!
//! It resolves the caller's [`Identity`] from the request headers and checks the caller's role against the roles the
//! route admits. A request without a usable identity gets a 401, and a caller whose role is not admitted gets a 403.
//! Admitted requests carry the identity in their extensions, so handlers don't parse the headers again.

use std::{future::Future, pin::Pin, rc::Rc};

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
    HttpMessage,
};
use court_engine::db_types::Role;
use futures::future::{ok, Ready};
use log::*;

use crate::{errors::ServerError, identity::Identity};

pub struct AclMiddlewareFactory {
    admitted_roles: Vec<Role>,
}

impl AclMiddlewareFactory {
    pub fn new(admitted_roles: &[Role]) -> Self {
        AclMiddlewareFactory { admitted_roles: admitted_roles.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AclMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { admitted_roles: self.admitted_roles.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    admitted_roles: Vec<Role>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let admitted_roles = self.admitted_roles.clone();
        Box::pin(async move {
            let identity = match Identity::from_headers(req.headers()) {
                Ok(identity) => identity,
                Err(e) => {
                    debug!("💻️ Rejecting request to {}. {e}", req.path());
                    return Ok(req.error_response(e).map_into_right_body());
                },
            };
            if !admitted_roles.contains(&identity.role) {
                debug!("💻️ {} may not call {}", identity.label(), req.path());
                let e = ServerError::InsufficientPermissions(format!(
                    "{} is not allowed to call {}",
                    identity.role,
                    req.path()
                ));
                return Ok(req.error_response(e).map_into_right_body());
            }
            req.extensions_mut().insert(identity);
            service.call(req).await.map(ServiceResponse::map_into_left_body)
        })
    }
}
