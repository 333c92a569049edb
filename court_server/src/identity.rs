//! Caller identity.
//!
//! Authentication happens upstream. A trusted proxy forwards the caller's user id, role and court in the
//! `x-court-user`, `x-court-role` and `x-court-id` headers, and the server takes them at face value.
use std::{
    future::{ready, Ready},
    ops::Deref,
    str::FromStr,
};

use actix_web::{dev::Payload, http::header::HeaderMap, FromRequest, HttpMessage, HttpRequest};
use court_engine::db_types::{Actor, Role};
use log::*;

use crate::errors::ServerError;

pub const USER_HEADER: &str = "x-court-user";
pub const ROLE_HEADER: &str = "x-court-role";
pub const COURT_HEADER: &str = "x-court-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(Actor);

impl Identity {
    pub fn actor(&self) -> &Actor {
        &self.0
    }

    pub fn into_actor(self) -> Actor {
        self.0
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ServerError> {
        let user_id = header_value(headers, USER_HEADER)?;
        let court_id = header_value(headers, COURT_HEADER)?;
        let role = header_value(headers, ROLE_HEADER)?;
        let role = match Role::from_str(role) {
            Ok(Role::System) | Err(_) => {
                return Err(ServerError::MissingIdentity(format!("{role} is not a valid {ROLE_HEADER}")));
            },
            Ok(role) => role,
        };
        Ok(Self(Actor::new(user_id, role, court_id)))
    }
}

impl Deref for Identity {
    type Target = Actor;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ServerError> {
    let value = headers
        .get(name)
        .ok_or_else(|| ServerError::MissingIdentity(format!("The {name} header is missing")))?
        .to_str()
        .map_err(|e| ServerError::MissingIdentity(format!("The {name} header is not valid text. {e}")))?
        .trim();
    if value.is_empty() {
        return Err(ServerError::MissingIdentity(format!("The {name} header is empty")));
    }
    Ok(value)
}

/// Uses the identity the ACL middleware already resolved, if any, and reads the headers otherwise.
impl FromRequest for Identity {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        if let Some(identity) = req.extensions().get::<Identity>() {
            return ready(Ok(identity.clone()));
        }
        let result = Identity::from_headers(req.headers());
        if let Err(e) = &result {
            debug!("💻️ Rejecting request to {}. {e}", req.path());
        }
        ready(result)
    }
}

#[cfg(test)]
mod test {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn reads_identity_headers() {
        let req = TestRequest::default()
            .insert_header((USER_HEADER, "asha"))
            .insert_header((ROLE_HEADER, "customer"))
            .insert_header((COURT_HEADER, "food-hall"))
            .to_http_request();
        let identity = Identity::from_headers(req.headers()).unwrap();
        assert_eq!(identity.actor(), &Actor::customer("asha", "food-hall"));
    }

    #[test]
    fn rejects_missing_or_unknown_roles() {
        let req = TestRequest::default()
            .insert_header((USER_HEADER, "asha"))
            .insert_header((COURT_HEADER, "food-hall"))
            .to_http_request();
        assert!(matches!(Identity::from_headers(req.headers()), Err(ServerError::MissingIdentity(_))));

        for role in ["system", "chef", ""] {
            let req = TestRequest::default()
                .insert_header((USER_HEADER, "asha"))
                .insert_header((ROLE_HEADER, role))
                .insert_header((COURT_HEADER, "food-hall"))
                .to_http_request();
            assert!(Identity::from_headers(req.headers()).is_err(), "{role} should be refused");
        }
    }
}
