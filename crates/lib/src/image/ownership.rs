//! Decides whether an image is produced by this build graph.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use super::split_tag;
use crate::consts::{DEV_TAG, EXTERNAL_BASE_IMAGES, OWNED_NAMESPACE};

static DEFAULT_POLICY: LazyLock<OwnershipPolicy> = LazyLock::new(OwnershipPolicy::default);

/// The naming rules that identify images built by this graph.
///
/// An image is owned when its repository starts with `namespace`, it is not
/// listed in `excluded`, and its tag is exactly `dev_tag`. Images in the
/// namespace with any other tag are published through a different path and
/// are treated as external.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipPolicy {
  pub namespace: String,
  pub dev_tag: String,
  pub excluded: Vec<String>,
}

impl Default for OwnershipPolicy {
  fn default() -> Self {
    Self {
      namespace: OWNED_NAMESPACE.to_string(),
      dev_tag: DEV_TAG.to_string(),
      excluded: EXTERNAL_BASE_IMAGES.iter().map(|s| s.to_string()).collect(),
    }
  }
}

impl OwnershipPolicy {
  pub fn is_owned(&self, image: &str) -> bool {
    let (repository, tag) = split_tag(image);
    if !repository.starts_with(&self.namespace) {
      return false;
    }
    if self.excluded.iter().any(|excluded| excluded == image) {
      return false;
    }
    tag == Some(self.dev_tag.as_str())
  }

  /// The tagged name a project's build produces for `repository`.
  pub fn dev_image(&self, repository: &str) -> String {
    format!("{}:{}", repository, self.dev_tag)
  }
}

/// [`OwnershipPolicy::is_owned`] with the default policy.
pub fn is_owned(image: &str) -> bool {
  DEFAULT_POLICY.is_owned(image)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dev_image_in_namespace_is_owned() {
    assert!(is_owned("airbyte/foo:dev"));
  }

  #[test]
  fn other_tag_is_not_owned() {
    assert!(!is_owned("airbyte/foo:latest"));
    assert!(!is_owned("airbyte/foo:0.1.0"));
  }

  #[test]
  fn untagged_name_is_not_owned() {
    assert!(!is_owned("airbyte/foo"));
  }

  #[test]
  fn other_namespace_is_not_owned() {
    assert!(!is_owned("other/foo:dev"));
    assert!(!is_owned("ubuntu:dev"));
    assert!(!is_owned("airbytehq/foo:dev"));
  }

  #[test]
  fn excluded_base_image_is_not_owned() {
    assert!(!is_owned("airbyte/base-airbyte-protocol-python:dev"));
  }

  #[test]
  fn exclusion_is_exact_match() {
    assert!(is_owned("airbyte/base-airbyte-protocol-python-extra:dev"));
  }

  #[test]
  fn namespace_prefix_applies_to_repository_not_tag() {
    assert!(!is_owned("foo:airbyte/dev"));
  }

  #[test]
  fn custom_policy() {
    let policy = OwnershipPolicy {
      namespace: "acme/".to_string(),
      dev_tag: "local".to_string(),
      excluded: vec![],
    };
    assert!(policy.is_owned("acme/api:local"));
    assert!(!policy.is_owned("acme/api:dev"));
    assert!(!policy.is_owned("airbyte/foo:dev"));
    assert_eq!(policy.dev_image("acme/api"), "acme/api:local");
  }
}
