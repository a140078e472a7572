//! Tagged image names and base-image hash snapshots.

mod ownership;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consts::UNKNOWN_HASH;
use crate::store::ImageIndex;

pub use ownership::{OwnershipPolicy, is_owned};

/// Split a tagged image name into its repository and tag.
///
/// A colon only separates the tag when it comes after the last `/`, so a
/// registry port (`localhost:5000/foo`) is kept as part of the repository.
pub fn split_tag(image: &str) -> (&str, Option<&str>) {
  let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
  match image[name_start..].rfind(':') {
    Some(i) => {
      let split = name_start + i;
      (&image[..split], Some(&image[split + 1..]))
    }
    None => (image, None),
  }
}

/// Hashes of a unit's base images, captured at one point in time.
///
/// Images the store did not list are recorded as [`UNKNOWN_HASH`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashSnapshot(BTreeMap<String, String>);

impl HashSnapshot {
  pub fn capture<'a>(bases: impl IntoIterator<Item = &'a String>, images: &ImageIndex) -> Self {
    Self(
      bases
        .into_iter()
        .map(|base| {
          let hash = images.hash_of(base).unwrap_or(UNKNOWN_HASH);
          (base.clone(), hash.to_string())
        })
        .collect(),
    )
  }

  pub fn get(&self, image: &str) -> Option<&str> {
    self.0.get(image).map(String::as_str)
  }

  pub fn is_unknown(&self, image: &str) -> bool {
    self.get(image) == Some(UNKNOWN_HASH)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn into_inner(self) -> BTreeMap<String, String> {
    self.0
  }

  /// First entry whose hash differs from `other`, as (image, ours, theirs).
  ///
  /// Keys present on only one side are reported with `None` on the missing side.
  pub fn first_difference<'a>(&'a self, other: &'a HashSnapshot) -> Option<(&'a str, Option<&'a str>, Option<&'a str>)> {
    let ours = self.0.iter().find_map(|(image, hash)| match other.get(image) {
      Some(theirs) if theirs == hash => None,
      theirs => Some((image.as_str(), Some(hash.as_str()), theirs)),
    });
    ours.or_else(|| {
      other
        .0
        .iter()
        .find(|(image, _)| !self.0.contains_key(*image))
        .map(|(image, hash)| (image.as_str(), None, Some(hash.as_str())))
    })
  }
}

impl FromIterator<(String, String)> for HashSnapshot {
  fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
    Self(iter.into_iter().collect())
  }
}

impl fmt::Display for HashSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let entries: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
    write!(f, "{{{}}}", entries.join(", "))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  mod split_tag {
    use super::*;

    #[test]
    fn splits_repository_and_tag() {
      assert_eq!(split_tag("airbyte/foo:dev"), ("airbyte/foo", Some("dev")));
    }

    #[test]
    fn untagged_name_has_no_tag() {
      assert_eq!(split_tag("ubuntu"), ("ubuntu", None));
    }

    #[test]
    fn registry_port_stays_in_repository() {
      assert_eq!(split_tag("localhost:5000/airbyte/foo"), ("localhost:5000/airbyte/foo", None));
      assert_eq!(
        split_tag("localhost:5000/airbyte/foo:1.2"),
        ("localhost:5000/airbyte/foo", Some("1.2"))
      );
    }
  }

  mod snapshot {
    use super::*;

    fn index(entries: &[(&str, &str)]) -> ImageIndex {
      entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn capture_records_unknown_images() {
      let bases = vec!["airbyte/base:dev".to_string(), "ubuntu:20.04".to_string()];
      let snapshot = HashSnapshot::capture(&bases, &index(&[("airbyte/base:dev", "h1")]));

      assert_eq!(snapshot.get("airbyte/base:dev"), Some("h1"));
      assert!(snapshot.is_unknown("ubuntu:20.04"));
      assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn identical_snapshots_have_no_difference() {
      let a: HashSnapshot = [("a:dev".to_string(), "h1".to_string())].into_iter().collect();
      assert_eq!(a.first_difference(&a.clone()), None);
    }

    #[test]
    fn changed_hash_is_reported() {
      let a: HashSnapshot = [("a:dev".to_string(), "h1".to_string())].into_iter().collect();
      let b: HashSnapshot = [("a:dev".to_string(), "h2".to_string())].into_iter().collect();
      assert_eq!(a.first_difference(&b), Some(("a:dev", Some("h1"), Some("h2"))));
    }

    #[test]
    fn added_and_removed_keys_are_reported() {
      let a: HashSnapshot = [("a:dev".to_string(), "h1".to_string())].into_iter().collect();
      let b = HashSnapshot::default();
      assert_eq!(a.first_difference(&b), Some(("a:dev", Some("h1"), None)));
      assert_eq!(b.first_difference(&a), Some(("a:dev", None, Some("h1"))));
    }

    #[test]
    fn display_lists_entries_in_order() {
      let s: HashSnapshot = [
        ("b:dev".to_string(), "h2".to_string()),
        ("a:dev".to_string(), "h1".to_string()),
      ]
      .into_iter()
      .collect();
      assert_eq!(s.to_string(), "{a:dev=h1, b:dev=h2}");
    }
  }
}
