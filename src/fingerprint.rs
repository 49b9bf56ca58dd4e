//! Request fingerprints
//!
//! Best-effort extraction of the values a token is bound to. A missing or
//! non-UTF-8 header yields an empty fingerprint, never an error.

use crate::validator::FingerprintKind;
use axum::http::{HeaderMap, HeaderName, header};
use std::net::IpAddr;

/// Edge proxy header consulted before any other client IP source.
pub const DEFAULT_TRUSTED_IP_HEADER: &str = "cf-connecting-ip";

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Anti-forgery header variants, in lookup order.
pub const CSRF_HEADERS: [&str; 3] = ["x-csrf-token", "x-csrftoken", "x-xsrf-token"];

/// Comparable values derived from one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprints {
    pub client_ip: String,
    pub device: String,
    pub csrf: String,
}

impl Fingerprints {
    pub fn get(&self, kind: FingerprintKind) -> &str {
        match kind {
            FingerprintKind::Ip => &self.client_ip,
            FingerprintKind::Device => &self.device,
            FingerprintKind::Csrf => &self.csrf,
        }
    }
}

/// Extracts [`Fingerprints`] from request headers and the peer address.
#[derive(Debug, Clone)]
pub struct FingerprintExtractor {
    trusted_ip_header: HeaderName,
}

impl Default for FingerprintExtractor {
    fn default() -> Self {
        Self {
            trusted_ip_header: HeaderName::from_static(DEFAULT_TRUSTED_IP_HEADER),
        }
    }
}

impl FingerprintExtractor {
    pub fn new(trusted_ip_header: HeaderName) -> Self {
        Self { trusted_ip_header }
    }

    pub fn extract(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Fingerprints {
        Fingerprints {
            client_ip: self.client_ip(headers, peer),
            device: header_str(headers, header::USER_AGENT.as_str())
                .unwrap_or_default()
                .to_string(),
            csrf: CSRF_HEADERS
                .iter()
                .find_map(|name| header_str(headers, name))
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn client_ip(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> String {
        let edge = headers
            .get(&self.trusted_ip_header)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = edge {
            return ip.to_string();
        }

        header_str(headers, FORWARDED_FOR)
            .or_else(|| header_str(headers, REAL_IP))
            .map(str::to_string)
            .or_else(|| peer.map(|ip| ip.to_string()))
            .unwrap_or_default()
    }
}

/// Convenience wrapper using the default trusted header.
pub fn extract(headers: &HeaderMap, peer: Option<IpAddr>) -> Fingerprints {
    FingerprintExtractor::default().extract(headers, peer)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
