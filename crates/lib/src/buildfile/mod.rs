//! Base-image extraction from container build files.
//!
//! Only the directives that reference other images are read:
//!
//! ```text
//! FROM [--platform=<p>] <image> [AS <alias>]
//! COPY --from=<image-or-alias-or-index> <src>... <dest>
//! ```
//!
//! Directives are matched by line prefix. There is no continuation-line or
//! comment handling beyond that. `${NAME}` references in the extracted names
//! are substituted from the environment; unset variables are left as written.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use thiserror::Error;

const FROM_PREFIX: &str = "FROM ";
const COPY_FROM_PREFIX: &str = "COPY --from=";
const LABEL_PREFIX: &str = "LABEL ";

#[derive(Debug, Error)]
pub enum BuildFileError {
  #[error("line {line}: FROM has no image")]
  EmptyFrom { line: usize },

  #[error("line {line}: COPY --from= has no stage or image")]
  EmptyCopyFrom { line: usize },

  #[error("line {line}: COPY --from={index} but only {stages} stage(s) precede it")]
  UnknownStageIndex { line: usize, index: usize, stages: usize },

  #[error("failed to read build file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// One `FROM` line.
#[derive(Debug)]
struct Stage {
  line: usize,
  image: String,
  alias: Option<String>,
}

/// Read a build file and return its base images.
pub fn read_base_images(path: &Path) -> Result<BTreeSet<String>, BuildFileError> {
  let contents = std::fs::read_to_string(path).map_err(|source| BuildFileError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  parse(&contents)
}

/// Every image the build file directly derives from or copies out of.
pub fn parse(contents: &str) -> Result<BTreeSet<String>, BuildFileError> {
  parse_with(contents, |name| std::env::var(name).ok())
}

/// [`parse`] with an explicit variable lookup.
pub fn parse_with<F>(contents: &str, lookup: F) -> Result<BTreeSet<String>, BuildFileError>
where
  F: Fn(&str) -> Option<String>,
{
  // First pass: stages and the aliases they declare.
  let mut stages = Vec::new();
  let mut aliases: HashMap<String, String> = HashMap::new();
  for (line, text) in numbered_lines(contents) {
    if let Some(rest) = text.strip_prefix(FROM_PREFIX) {
      let stage = parse_from(line, rest)?;
      let image = resolve_alias(&aliases, &stage.image);
      if let Some(alias) = &stage.alias {
        aliases.insert(alias.clone(), image.clone());
      }
      stages.push(Stage { image, ..stage });
    }
  }

  // Second pass: every referenced image, with stage references resolved.
  let mut referenced: Vec<(BuildFileError, String)> = Vec::new();
  let mut stages_seen = 0;
  for (line, text) in numbered_lines(contents) {
    if text.starts_with(FROM_PREFIX) {
      let stage = &stages[stages_seen];
      referenced.push((BuildFileError::EmptyFrom { line: stage.line }, stage.image.clone()));
      stages_seen += 1;
    } else if let Some(rest) = text.strip_prefix(COPY_FROM_PREFIX) {
      let source = rest
        .split(char::is_whitespace)
        .next()
        .filter(|s| !s.is_empty())
        .ok_or(BuildFileError::EmptyCopyFrom { line })?;
      let image = match source.parse::<usize>() {
        Ok(index) => stages
          .get(index)
          .filter(|_| index < stages_seen)
          .map(|stage| stage.image.clone())
          .ok_or(BuildFileError::UnknownStageIndex {
            line,
            index,
            stages: stages_seen,
          })?,
        Err(_) => resolve_alias(&aliases, source),
      };
      referenced.push((BuildFileError::EmptyCopyFrom { line }, image));
    }
  }

  let mut result = BTreeSet::new();
  for (if_empty, image) in referenced {
    let image = substitute(&image, &lookup).trim().to_string();
    if image.is_empty() {
      return Err(if_empty);
    }
    result.insert(image);
  }
  Ok(result)
}

/// Replace `${NAME}` references using `lookup`; unknown names stay verbatim.
pub fn substitute<F>(value: &str, lookup: F) -> String
where
  F: Fn(&str) -> Option<String>,
{
  static VAR_REGEX: OnceLock<Regex> = OnceLock::new();
  let re = VAR_REGEX.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid variable regex"));
  re.replace_all(value, |caps: &Captures| lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string()))
    .into_owned()
}

/// Value of the first `LABEL key=value` entry for `key`, unquoted.
pub fn label(contents: &str, key: &str) -> Option<String> {
  numbered_lines(contents)
    .filter_map(|(_, text)| text.strip_prefix(LABEL_PREFIX))
    .flat_map(str::split_whitespace)
    .find_map(|pair| {
      let (k, v) = pair.split_once('=')?;
      (k == key).then(|| v.trim_matches('"').to_string())
    })
}

fn numbered_lines(contents: &str) -> impl Iterator<Item = (usize, &str)> {
  contents.lines().enumerate().map(|(i, text)| (i + 1, text.trim_start()))
}

fn parse_from(line: usize, rest: &str) -> Result<Stage, BuildFileError> {
  let mut tokens = rest.split_whitespace().skip_while(|t| t.starts_with("--"));
  let image = tokens.next().ok_or(BuildFileError::EmptyFrom { line })?.to_string();
  let alias = match tokens.next() {
    Some(keyword) if keyword.eq_ignore_ascii_case("as") => tokens.next().map(str::to_string),
    _ => None,
  };
  Ok(Stage { line, image, alias })
}

fn resolve_alias(aliases: &HashMap<String, String>, name: &str) -> String {
  aliases.get(name).cloned().unwrap_or_else(|| name.to_string())
}
