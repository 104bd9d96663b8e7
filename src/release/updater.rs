//! File updates carried by release candidates
//!
//! Each [`Update`] names a path and an [`Updater`] that rewrites the file's content.
//! Updaters are a closed set; two updates on the same path are composed rather than
//! replaced (see [`merge_updates`]).

use crate::core::error::{ReleaseError, ReleaseResult, ResultExt};
use crate::release::version::VersionsMap;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesText, Event};
use regex::Regex;
use semver::Version;
use serde::Serialize;
use std::io::Cursor;
use std::sync::LazyLock;
use toml_edit::{DocumentMut, Item};
use tracing::{debug, info};

const CHANGELOG_HEADER: &str = "# Changelog";
const DEPENDENCY_KINDS: &[&str] = &["dependencies", "dev-dependencies", "build-dependencies"];
const NODE_DEPENDENCY_KINDS: &[&str] = &["dependencies", "devDependencies", "peerDependencies", "optionalDependencies"];
const RANGE_PREFIXES: &[&str] = &[">=", "<=", "^", "~", ">", "<"];

static CHANGELOG_ENTRY_HEADING: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?m)^##? ?\[?v?[0-9]").expect("static regex"));
static GENERIC_VERSION: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\d+\.\d+\.\d+(?:-[\w.]+)?(?:\+[\w.\-]+)?").expect("static regex")
});
static GENERIC_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+\b").expect("static regex"));
static INLINE_MARKER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"x-release-please-(?P<scope>major|minor|patch|version)").expect("static regex"));
static BLOCK_START: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"x-release-please-start-(?P<scope>major|minor|patch|version)").expect("static regex"));
static BLOCK_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"x-release-please-end").expect("static regex"));

/// A pending write to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
  pub path: String,
  /// Write the file even when it does not exist yet
  pub create_if_missing: bool,
  pub updater: Updater,
}

impl Update {
  pub fn new(path: impl Into<String>, updater: Updater) -> Self {
    Self {
      path: path.into(),
      create_if_missing: false,
      updater,
    }
  }

  pub fn creating(path: impl Into<String>, updater: Updater) -> Self {
    Self {
      path: path.into(),
      create_if_missing: true,
      updater,
    }
  }
}

/// Content rewriters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Updater {
  /// Prepend a release entry to a markdown changelog
  Changelog { version: Version, entry: String },
  /// Replace a plain version file
  VersionFile { version: Version },
  /// Set `package.version` and bump path dependencies listed in `versions_map`
  CargoToml { version: Version, versions_map: VersionsMap },
  /// Set `version` and bump dependencies listed in `versions_map`, keeping range prefixes
  PackageJson { version: Version, versions_map: VersionsMap },
  /// Set the project version, and parent/dependency versions keyed by `groupId:artifactId`
  PomXml { version: Version, versions_map: VersionsMap },
  /// Write path -> version entries into the versions manifest
  ReleaseManifest { versions_map: VersionsMap },
  /// Replace versions on lines tagged with `x-release-please-*` markers
  Generic { version: Version },
  /// Replace the whole file
  RawContent { content: String },
  /// Several updaters applied in order
  Composite(Vec<Updater>),
}

impl Updater {
  /// Produce the new content. `None` means the file does not exist.
  pub fn update_content(&self, content: Option<&str>) -> ReleaseResult<String> {
    match self {
      Updater::Changelog { entry, .. } => Ok(update_changelog(content, entry)),
      Updater::VersionFile { version } => Ok(version.to_string()),
      Updater::CargoToml { version, versions_map } => {
        update_cargo_toml(require(content, "Cargo.toml")?, version, versions_map)
      }
      Updater::PackageJson { version, versions_map } => {
        update_package_json(require(content, "package.json")?, version, versions_map)
      }
      Updater::PomXml { version, versions_map } => update_pom_xml(require(content, "pom.xml")?, version, versions_map),
      Updater::ReleaseManifest { versions_map } => update_release_manifest(content, versions_map),
      Updater::Generic { version } => Ok(content.map(|c| update_generic(c, version)).unwrap_or_default()),
      Updater::RawContent { content } => Ok(content.clone()),
      Updater::Composite(updaters) => {
        let mut current = content.map(str::to_string);
        for updater in updaters {
          current = Some(updater.update_content(current.as_deref())?);
        }
        Ok(current.unwrap_or_default())
      }
    }
  }
}

/// Merge updates by path. Same-path updaters compose in input order.
pub fn merge_updates(updates: Vec<Update>) -> Vec<Update> {
  let mut merged: Vec<Update> = Vec::new();
  for update in updates {
    let Some(existing) = merged.iter_mut().find(|u| u.path == update.path) else {
      merged.push(update);
      continue;
    };
    existing.create_if_missing |= update.create_if_missing;
    let previous = std::mem::replace(&mut existing.updater, Updater::Composite(Vec::new()));
    existing.updater = match previous {
      Updater::Composite(mut inner) => {
        inner.push(update.updater);
        Updater::Composite(inner)
      }
      other => Updater::Composite(vec![other, update.updater]),
    };
  }
  merged
}

fn require<'a>(content: Option<&'a str>, kind: &str) -> ReleaseResult<&'a str> {
  content.ok_or_else(|| ReleaseError::message(format!("cannot update missing {}", kind)))
}

fn update_changelog(content: Option<&str>, entry: &str) -> String {
  let Some(content) = content.filter(|c| !c.trim().is_empty()) else {
    return format!("{}\n\n{}\n", CHANGELOG_HEADER, entry.trim_end());
  };
  match CHANGELOG_ENTRY_HEADING.find(content) {
    Some(found) => {
      let (before, after) = content.split_at(found.start());
      format!("{}\n\n{}\n\n{}", before.trim_end(), entry.trim_end(), after)
        .trim_start()
        .to_string()
    }
    None => format!("{}\n\n{}\n", content.trim_end(), entry.trim_end()),
  }
}

fn update_cargo_toml(content: &str, version: &Version, versions_map: &VersionsMap) -> ReleaseResult<String> {
  let mut doc: DocumentMut = content.parse().context("Failed to parse Cargo.toml")?;

  let Some(package) = doc.get_mut("package").and_then(Item::as_table_like_mut) else {
    return Err(ReleaseError::message(
      "Cargo.toml is not a package manifest (might be a cargo workspace)",
    ));
  };
  let inherited = package
    .get("version")
    .and_then(Item::as_table_like)
    .is_some_and(|t| t.get("workspace").and_then(Item::as_bool) == Some(true));
  if inherited {
    debug!("package version is inherited from the workspace, leaving it alone");
  } else if let Some(item) = package.get_mut("version") {
    set_string(item, &version.to_string());
  } else {
    package.insert("version", toml_edit::value(version.to_string()));
  }

  for kind in DEPENDENCY_KINDS {
    if let Some(deps) = doc.get_mut(kind).and_then(Item::as_table_like_mut) {
      bump_cargo_dependencies(deps, kind, versions_map);
    }
  }
  if let Some(targets) = doc.get_mut("target").and_then(Item::as_table_like_mut) {
    for (target, item) in targets.iter_mut() {
      let Some(target_table) = item.as_table_like_mut() else {
        continue;
      };
      for kind in DEPENDENCY_KINDS {
        if let Some(deps) = target_table.get_mut(kind).and_then(Item::as_table_like_mut) {
          bump_cargo_dependencies(deps, &format!("target.{}.{}", target.get(), kind), versions_map);
        }
      }
    }
  }
  Ok(doc.to_string())
}

/// Only path dependencies with an explicit version are rewritten
fn bump_cargo_dependencies(deps: &mut dyn toml_edit::TableLike, kind: &str, versions_map: &VersionsMap) {
  for (name, new_version) in versions_map {
    let Some(dep) = deps.get_mut(name).and_then(Item::as_table_like_mut) else {
      continue;
    };
    if dep.get("path").is_none() || dep.get("version").is_none() {
      debug!("skipping {}.{}", kind, name);
      continue;
    }
    info!("updating {}.{} to {}", kind, name, new_version);
    if let Some(item) = dep.get_mut("version") {
      set_string(item, &new_version.to_string());
    }
  }
}

/// Replace a string value in place, keeping its surrounding whitespace and comments
fn set_string(item: &mut Item, text: &str) {
  match item.as_value_mut() {
    Some(current) => {
      let decor = current.decor().clone();
      *current = toml_edit::Value::from(text);
      *current.decor_mut() = decor;
    }
    None => *item = toml_edit::value(text),
  }
}

fn update_package_json(content: &str, version: &Version, versions_map: &VersionsMap) -> ReleaseResult<String> {
  let mut parsed: serde_json::Value = serde_json::from_str(content).context("Failed to parse package.json")?;
  let Some(object) = parsed.as_object_mut() else {
    return Err(ReleaseError::message("package.json is not an object"));
  };
  info!(
    "updating package.json from {} to {}",
    object.get("version").and_then(|v| v.as_str()).unwrap_or("(none)"),
    version
  );
  object.insert("version".to_string(), serde_json::Value::String(version.to_string()));

  for kind in NODE_DEPENDENCY_KINDS {
    let Some(deps) = object.get_mut(*kind).and_then(|d| d.as_object_mut()) else {
      continue;
    };
    for (name, range) in deps.iter_mut() {
      let (Some(new_version), Some(old)) = (versions_map.get(name), range.as_str()) else {
        continue;
      };
      // protocol ranges such as `workspace:*` or `file:../x` are left alone
      if old.contains(':') {
        continue;
      }
      let prefix = RANGE_PREFIXES.iter().find(|p| old.starts_with(**p)).copied().unwrap_or("");
      *range = serde_json::Value::String(format!("{}{}", prefix, new_version));
    }
  }
  write_json(&parsed, content)
}

fn update_release_manifest(content: Option<&str>, versions_map: &VersionsMap) -> ReleaseResult<String> {
  let mut parsed: serde_json::Value = match content {
    Some(content) if !content.trim().is_empty() => {
      serde_json::from_str(content).context("Failed to parse versions manifest")?
    }
    _ => serde_json::Value::Object(serde_json::Map::new()),
  };
  let Some(object) = parsed.as_object_mut() else {
    return Err(ReleaseError::message("versions manifest is not an object"));
  };
  for (path, version) in versions_map {
    object.insert(path.clone(), serde_json::Value::String(version.to_string()));
  }
  write_json(&parsed, content.unwrap_or("{}\n"))
}

/// Serialize keeping the original indentation and trailing newline
fn write_json(value: &serde_json::Value, original: &str) -> ReleaseResult<String> {
  let indent = detect_indent(original);
  let mut buffer = Vec::new();
  let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
  let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
  value.serialize(&mut serializer)?;
  let mut output = String::from_utf8(buffer)?;
  if original.ends_with('\n') {
    output.push('\n');
  }
  Ok(output)
}

fn detect_indent(content: &str) -> String {
  content
    .lines()
    .skip(1)
    .find_map(|line| {
      let indent: String = line.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
      (!indent.is_empty()).then_some(indent)
    })
    .unwrap_or_else(|| "  ".to_string())
}

fn update_generic(content: &str, version: &Version) -> String {
  let replace = |line: &str, scope: &str| -> String {
    match scope {
      "major" => GENERIC_NUMBER.replace(line, version.major.to_string()).into_owned(),
      "minor" => GENERIC_NUMBER.replace(line, version.minor.to_string()).into_owned(),
      "patch" => GENERIC_NUMBER.replace(line, version.patch.to_string()).into_owned(),
      _ => GENERIC_VERSION.replace(line, version.to_string()).into_owned(),
    }
  };

  let mut block_scope: Option<String> = None;
  let mut lines = Vec::new();
  for line in content.split('\n') {
    if let Some(scope) = &block_scope {
      if BLOCK_END.is_match(line) {
        block_scope = None;
        lines.push(line.to_string());
      } else {
        lines.push(replace(line, scope));
      }
    } else if let Some(caps) = BLOCK_START.captures(line) {
      block_scope = Some(caps["scope"].to_string());
      lines.push(line.to_string());
    } else if let Some(caps) = INLINE_MARKER.captures(line) {
      lines.push(replace(line, &caps["scope"]));
    } else {
      lines.push(line.to_string());
    }
  }
  lines.join("\n")
}

/// Element context while streaming a pom
#[derive(Debug, Default)]
struct PomCoordinates {
  group_id: Option<String>,
  artifact_id: Option<String>,
}

impl PomCoordinates {
  fn key(&self) -> Option<String> {
    Some(format!("{}:{}", self.group_id.as_ref()?, self.artifact_id.as_ref()?))
  }
}

/// Rewrites `project/version`, plus the version inside `parent` and `dependency` blocks
/// whose `groupId:artifactId` is in `versions_map`. Everything else streams through.
fn update_pom_xml(content: &str, version: &Version, versions_map: &VersionsMap) -> ReleaseResult<String> {
  let mut reader = Reader::from_str(content);
  let mut writer = Writer::new(Cursor::new(Vec::new()));
  let mut path: Vec<String> = Vec::new();
  // buffered events of the current parent/dependency block
  let mut block: Option<(Vec<Event<'static>>, PomCoordinates)> = None;

  loop {
    let event = reader.read_event().context("Failed to parse pom.xml")?;
    match &event {
      Event::Eof => break,
      Event::Start(e) => {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        path.push(name.clone());
        if block.is_none() && is_coordinate_block(&path) {
          block = Some((Vec::new(), PomCoordinates::default()));
        }
      }
      Event::Text(e) => {
        let text = e.unescape().context("Failed to parse pom.xml")?.trim().to_string();
        let leaf = path.last().map(String::as_str);
        if let Some((_, coordinates)) = block.as_mut() {
          let in_block_root = path.len() >= 2 && is_coordinate_block(&path[..path.len() - 1]);
          if in_block_root {
            match leaf {
              Some("groupId") => coordinates.group_id = Some(text),
              Some("artifactId") => coordinates.artifact_id = Some(text),
              _ => {}
            }
          }
        } else if path.len() == 2 && path[0] == "project" && leaf == Some("version") {
          debug!("updating project version to {}", version);
          writer.write_event(Event::Text(BytesText::new(&version.to_string())))?;
          continue;
        }
      }
      _ => {}
    }

    let closing_block = matches!(&event, Event::End(_)) && is_coordinate_block(&path);
    if let Event::End(_) = &event {
      path.pop();
    }

    match block.as_mut() {
      Some((events, _)) => events.push(event.into_owned()),
      None => writer.write_event(event)?,
    }

    if closing_block && let Some((events, coordinates)) = block.take() {
      let replacement = coordinates.key().and_then(|key| versions_map.get(&key).map(|v| (key, v)));
      flush_block(&mut writer, events, replacement)?;
    }
  }

  let bytes = writer.into_inner().into_inner();
  Ok(String::from_utf8(bytes)?)
}

fn is_coordinate_block(path: &[String]) -> bool {
  let names: Vec<&str> = path.iter().map(String::as_str).collect();
  matches!(
    names.as_slice(),
    ["project", "parent"]
      | ["project", "dependencies", "dependency"]
      | ["project", "dependencyManagement", "dependencies", "dependency"]
  )
}

fn flush_block(
  writer: &mut Writer<Cursor<Vec<u8>>>,
  events: Vec<Event<'static>>,
  replacement: Option<(String, &Version)>,
) -> ReleaseResult<()> {
  let mut depth = 0usize;
  let mut in_version = false;
  for event in events {
    match &event {
      Event::Start(e) => {
        depth += 1;
        in_version = depth == 2 && e.name().as_ref() == b"version";
      }
      Event::End(_) => {
        depth = depth.saturating_sub(1);
        in_version = false;
      }
      Event::Text(_) if in_version => {
        if let Some((key, version)) = &replacement {
          info!("updating {} to {}", key, version);
          writer.write_event(Event::Text(BytesText::new(&version.to_string())))?;
          continue;
        }
      }
      _ => {}
    }
    writer.write_event(event)?;
  }
  Ok(())
}
