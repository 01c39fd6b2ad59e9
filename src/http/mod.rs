//! Wire-level HTTP/1.1 types: [`Method`], [`StatusCode`], [`Headers`],
//! [`Request`] and [`Response`].

use std::{convert::Infallible, fmt, str::FromStr};

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::Request;
pub use response::Response;

// One table drives the enum, the numeric value and the reason phrase.
macro_rules! status_codes {
    ($($variant:ident = $code:literal, $reason:literal;)+) => {
        /// Response status codes the toolkit produces.
        ///
        /// ```
        /// use thunder::http::StatusCode;
        ///
        /// assert_eq!(StatusCode::Unauthorized.as_u16(), 401);
        /// assert_eq!(StatusCode::NoContent.to_string(), "204 No Content");
        /// ```
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum StatusCode {
            $($variant = $code,)+
        }

        impl StatusCode {
            pub fn canonical_reason(self) -> &'static str {
                match self {
                    $(Self::$variant => $reason,)+
                }
            }
        }
    };
}

status_codes! {
    Ok = 200, "OK";
    Created = 201, "Created";
    Accepted = 202, "Accepted";
    NoContent = 204, "No Content";
    NotModified = 304, "Not Modified";
    BadRequest = 400, "Bad Request";
    Unauthorized = 401, "Unauthorized";
    Forbidden = 403, "Forbidden";
    NotFound = 404, "Not Found";
    MethodNotAllowed = 405, "Method Not Allowed";
    PayloadTooLarge = 413, "Payload Too Large";
    TooManyRequests = 429, "Too Many Requests";
    InternalServerError = 500, "Internal Server Error";
    BadGateway = 502, "Bad Gateway";
    ServiceUnavailable = 503, "Service Unavailable";
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn is_success(self) -> bool {
        (200..300).contains(&self.as_u16())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

/// Request method. Anything outside the common set is kept verbatim in
/// [`Method::Custom`], so parsing never fails.
///
/// ```
/// use thunder::http::Method;
///
/// let method: Method = "POST".parse().unwrap();
/// assert_eq!(method, Method::Post);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Custom(String),
}

const KNOWN_METHODS: [(&str, Method); 7] = [
    ("GET", Method::Get),
    ("POST", Method::Post),
    ("PUT", Method::Put),
    ("DELETE", Method::Delete),
    ("HEAD", Method::Head),
    ("OPTIONS", Method::Options),
    ("PATCH", Method::Patch),
];

impl Method {
    pub fn as_str(&self) -> &str {
        if let Self::Custom(name) = self {
            return name;
        }
        KNOWN_METHODS
            .iter()
            .find(|(_, known)| known == self)
            .map_or("", |(name, _)| *name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(KNOWN_METHODS
            .iter()
            .find(|(name, _)| *name == s)
            .map_or_else(|| Self::Custom(s.to_owned()), |(_, method)| method.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_round_trip() {
        for (name, method) in &KNOWN_METHODS {
            assert_eq!(name.parse::<Method>().unwrap(), *method);
            assert_eq!(method.as_str(), *name);
        }
        let purge: Method = "PURGE".parse().unwrap();
        assert_eq!(purge, Method::Custom("PURGE".to_owned()));
        assert_eq!(purge.to_string(), "PURGE");
    }

    #[test]
    fn only_2xx_is_success() {
        assert!(StatusCode::NoContent.is_success());
        assert!(!StatusCode::NotModified.is_success());
        assert!(!StatusCode::InternalServerError.is_success());
    }
}
