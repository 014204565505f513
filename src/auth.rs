// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Bearer credentials consumed by the request helpers

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bearer token with its decoded claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub value: String,
    #[serde(default)]
    pub claims: HashMap<String, serde_json::Value>,
}

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            claims: HashMap::new(),
        }
    }

    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.claims.get(name)
    }
}

/// Source of bearer tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self) -> Result<Token>;
}

/// Token provider returning a fixed token, or failing when it has none
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<Token>,
}

impl StaticTokenProvider {
    pub fn new(token: Token) -> Self {
        Self { token: Some(token) }
    }

    /// Provider that always fails to authenticate
    pub fn unauthenticated() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self) -> Result<Token> {
        self.token
            .clone()
            .ok_or_else(|| Error::Authentication("no token available".to_string()))
    }
}
