//! Shared request guards used by the platform adapter routes.

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

pub struct AdminKey(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminKey {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        if let Some(auth) = req.headers().get_one("Authorization")
            && let Some(key) = auth.strip_prefix("Bearer ")
        {
            return Outcome::Success(AdminKey(key.to_string()));
        }
        if let Some(key) = req.headers().get_one("X-Admin-Key") {
            return Outcome::Success(AdminKey(key.to_string()));
        }
        Outcome::Forward(Status::Unauthorized)
    }
}
