//! Crate-wide constants.

/// Hash recorded for an image the store did not list at query time.
pub const UNKNOWN_HASH: &str = "???";

/// Repository prefix of every image this build graph may produce.
pub const OWNED_NAMESPACE: &str = "airbyte/";

/// Tag given to images built from a local build file.
pub const DEV_TAG: &str = "dev";

/// Shares the owned namespace but is built outside of this graph.
pub const EXTERNAL_BASE_IMAGES: &[&str] = &["airbyte/base-airbyte-protocol-python:dev"];

/// Build file label naming the repository a project publishes.
pub const IMAGE_NAME_LABEL: &str = "io.airbyte.name";

pub const DEFAULT_BUILD_FILE: &str = "Dockerfile";
pub const DEFAULT_BUILD_SCRIPT: &str = "tools/bin/build_image.sh";
pub const DEFAULT_DOCKER: &str = "docker";
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Length of the truncated hash used in artifact file names.
pub const ARTIFACT_HASH_PREFIX_LEN: usize = 20;
