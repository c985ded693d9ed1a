use std::cell::RefCell;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::ExecutionContext;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReference {
    pub execution_id: u64,
    pub url: String,
    pub is_defect: bool,
}

/// Stores the association between an execution and a bug URL.
///
/// Implementations must be idempotent on `(execution_id, url)`.
pub trait LinkRecorder {
    fn get_or_create(
        &self,
        execution: &ExecutionContext,
        url: &str,
        is_defect: bool,
    ) -> Result<LinkReference>;
}

#[derive(Debug, Default)]
pub struct InMemoryLinkRecorder {
    links: RefCell<Vec<LinkReference>>,
}

impl InMemoryLinkRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn links(&self) -> Vec<LinkReference> {
        self.links.borrow().clone()
    }
}

impl LinkRecorder for InMemoryLinkRecorder {
    fn get_or_create(
        &self,
        execution: &ExecutionContext,
        url: &str,
        is_defect: bool,
    ) -> Result<LinkReference> {
        let mut links = self.links.borrow_mut();
        if let Some(existing) = links
            .iter()
            .find(|link| link.execution_id == execution.execution_id && link.url == url)
        {
            return Ok(existing.clone());
        }

        let link = LinkReference {
            execution_id: execution.execution_id,
            url: url.to_string(),
            is_defect,
        };
        links.push(link.clone());
        Ok(link)
    }
}
