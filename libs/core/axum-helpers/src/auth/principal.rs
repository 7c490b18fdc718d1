use super::jwt::Scope;
use crate::errors::AppError;
use axum::{extract::FromRequestParts, http::request::Parts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    /// Authenticated with a bearer token
    User,
    /// Authenticated with the static API key
    Service,
}

/// The authenticated caller, inserted into request extensions by the auth middlewares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub scopes: Vec<Scope>,
    pub kind: PrincipalKind,
}

impl Principal {
    pub fn user(subject: impl Into<String>, scopes: Vec<Scope>) -> Self {
        Self {
            subject: subject.into(),
            scopes,
            kind: PrincipalKind::User,
        }
    }

    pub fn service(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            scopes: Scope::ALL.to_vec(),
            kind: PrincipalKind::Service,
        }
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    pub fn require(&self, scope: Scope) -> Result<(), AppError> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Insufficient permission: '{scope}' scope required"
            )))
        }
    }
}

fn principal_with(parts: &Parts, scope: Scope) -> Result<Principal, AppError> {
    let principal = parts
        .extensions
        .get::<Principal>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;
    principal.require(scope)?;
    Ok(principal)
}

/// Extracts the caller and requires the `read` scope.
#[derive(Debug, Clone)]
pub struct ReadAccess(pub Principal);

impl<S> FromRequestParts<S> for ReadAccess
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_with(parts, Scope::Read).map(ReadAccess)
    }
}

/// Extracts the caller and requires the `write` scope.
#[derive(Debug, Clone)]
pub struct WriteAccess(pub Principal);

impl<S> FromRequestParts<S> for WriteAccess
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_with(parts, Scope::Write).map(WriteAccess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(principal: Option<Principal>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(principal) = principal {
            builder = builder.extension(principal);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_missing_principal_is_unauthorized() {
        let mut parts = parts_with(None);
        let err = ReadAccess::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_read_only_token_cannot_write() {
        let mut parts = parts_with(Some(Principal::user("admin", vec![Scope::Read])));
        assert!(ReadAccess::from_request_parts(&mut parts, &()).await.is_ok());

        let err = WriteAccess::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_service_principal_has_all_scopes() {
        let mut parts = parts_with(Some(Principal::service("sofia")));
        let WriteAccess(principal) = WriteAccess::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(principal.kind, PrincipalKind::Service);
    }
}
