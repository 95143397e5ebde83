//! Request validation on top of [`validator`].

use api_protocol::FieldError;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use crate::{error::ServerError, extract::AppJson};

/// JSON body extractor that also runs the body's validation rules.
///
/// Malformed JSON and rule violations both reject with a 400 carrying the
/// per-field errors.
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let AppJson(value) = AppJson::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Flattens `errors` into wire field errors, sorted by field name.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut fields: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let name = camel_case(&field.to_string());
            errs.iter().map(move |err| {
                let message = err
                    .message
                    .as_deref()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.code.to_string());
                FieldError::new(name.clone(), message)
            })
        })
        .collect();
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use api_protocol::{CreateTaskRequest, RegisterRequest, UpdateUserRequest};
    use axum::{body::Body, http::header};
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("first_name"), "firstName");
        assert_eq!(camel_case("estimated_hours"), "estimatedHours");
        assert_eq!(camel_case("email"), "email");
    }

    #[test]
    fn test_register_errors_are_camel_cased_and_sorted() {
        let request = RegisterRequest {
            first_name: "A".to_string(),
            last_name: "Lovelace".to_string(),
            email: "nope".to_string(),
            password: "123".to_string(),
            role: None,
        };
        let errors = field_errors(&request.validate().unwrap_err());

        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "firstName", "password"]);
        assert_eq!(errors[0].message, "Please provide a valid email");
        assert_eq!(
            errors[1].message,
            "First name must be between 2 and 50 characters"
        );
    }

    #[test]
    fn test_malformed_emails() {
        for email in [
            "ada@example..com",
            "ada@-bad-.com",
            "a\"b(c)d,e:f;g<h>i@x.y",
            "ada@exa_mple.com",
        ] {
            let request = UpdateUserRequest {
                email: Some(email.to_string()),
                ..UpdateUserRequest::default()
            };
            let errors = field_errors(&request.validate().unwrap_err());
            assert_eq!(errors.len(), 1, "{email}");
            assert_eq!(errors[0].field, "email");
        }
    }

    #[test]
    fn test_validation_error_envelope() {
        let request = CreateTaskRequest {
            title: "ab".to_string(),
            description: None,
            project_id: Uuid::new_v4(),
            assigned_to_id: None,
            priority: None,
            due_date: None,
            estimated_hours: Some(-2.0),
            labels: Default::default(),
        };
        let err: ServerError = request.validate().unwrap_err().into();

        match err {
            ServerError::Validation { message, errors } => {
                assert_eq!(message, "Validation errors");
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["estimatedHours", "title"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_valid_json_trims_before_checking() {
        let body = serde_json::json!({
            "firstName": "  A  ",
            "lastName": "  Lovelace  ",
            "email": " ada@example.com ",
            "password": "secret1"
        });
        let request = Request::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let err = ValidJson::<RegisterRequest>::from_request(request, &())
            .await
            .unwrap_err();
        match err {
            ServerError::Validation { errors, .. } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "firstName");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let body = serde_json::json!({
            "firstName": " Ada ",
            "lastName": "Lovelace",
            "email": " ada@example.com ",
            "password": "secret1"
        });
        let request = Request::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let ValidJson(parsed) = ValidJson::<RegisterRequest>::from_request(request, &())
            .await
            .unwrap();
        assert_eq!(parsed.first_name, "Ada");
        assert_eq!(parsed.email, "ada@example.com");
    }
}
