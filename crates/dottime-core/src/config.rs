use std::collections::BTreeMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace
};

use crate::partition::ViewMode;

const RCFILE_ENV_VAR: &str = "DOTTIMERC";

const DEFAULTS: &[(&str, &str)] = &[
  ("data.location", "~/.dottime"),
  ("default.command", "show"),
  ("default.view", "month"),
  ("default.birth_year", "1990"),
  ("color", "on"),
  ("grid.glyph.passed", "●"),
  ("grid.glyph.today", "◉"),
  ("grid.glyph.future", "·"),
  ("grid.columns.month", "7"),
  ("grid.columns.year", "16"),
  ("grid.columns.life", "10")
];

#[derive(Debug, Clone)]
pub struct Config {
  map:              BTreeMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rcfile_override
  ))]
  pub fn load(
    rcfile_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rcfile = resolve_rcfile_path(
      rcfile_override
    )?;
    if let Some(path) = rcfile {
      info!(rcfile = %path.display(), "loading rc file");
      cfg.load_file(&path, &mut Vec::new())?;
    } else {
      debug!(
        "no rc file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) {
    self.map.insert(
      key.to_string(),
      value.to_string()
    );
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn get_u32(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u32>> {
    self
      .map
      .get(key)
      .map(|v| {
        v.trim().parse::<u32>().with_context(
          || {
            format!(
              "config key {key} is not \
               a non-negative integer: \
               {v}"
            )
          }
        )
      })
      .transpose()
  }

  pub fn get_i32(
    &self,
    key: &str
  ) -> anyhow::Result<Option<i32>> {
    self
      .map
      .get(key)
      .map(|v| {
        v.trim().parse::<i32>().with_context(
          || {
            format!(
              "config key {key} is not \
               an integer: {v}"
            )
          }
        )
      })
      .transpose()
  }

  pub fn default_view(
    &self
  ) -> anyhow::Result<ViewMode> {
    self
      .get("default.view")
      .unwrap_or_else(|| {
        "month".to_string()
      })
      .parse()
      .context(
        "invalid config key \
         default.view"
      )
  }

  pub fn default_birth_year(
    &self
  ) -> anyhow::Result<i32> {
    Ok(
      self
        .get_i32("default.birth_year")?
        .unwrap_or(
          crate::partition::DEFAULT_BIRTH_YEAR
        )
    )
  }

  pub fn grid_columns(
    &self,
    mode: ViewMode
  ) -> anyhow::Result<u32> {
    let key = format!(
      "grid.columns.{}",
      mode.as_str()
    );
    let columns = self
      .get_u32(&key)?
      .unwrap_or(match mode {
        | ViewMode::Month => 7,
        | ViewMode::Year => 16,
        | ViewMode::Life => 10
      });
    if columns == 0 {
      return Err(anyhow!(
        "config key {key} must be at \
         least 1"
      ));
    }
    Ok(columns)
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  /// `chain` holds the canonical paths
  /// of the files currently being
  /// included, outermost first.
  #[tracing::instrument(skip(
    self, chain
  ))]
  fn load_file(
    &mut self,
    path: &Path,
    chain: &mut Vec<PathBuf>
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());
    chain.push(canonical_path(&path)?);

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = strip_comment(raw_line);
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if !include_path.exists() {
          tracing::warn!(include = %include_path.display(), "include file does not exist; skipping");
          continue;
        }

        if chain.contains(
          &canonical_path(&include_path)?
        ) {
          return Err(anyhow!(
            "include cycle at {}:{}: \
             {}",
            path.display(),
            line_num + 1,
            include_path.display()
          ));
        }

        self
          .load_file(&include_path, chain)?;
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    chain.pop();
    Ok(())
  }
}

fn canonical_path(
  path: &Path
) -> anyhow::Result<PathBuf> {
  fs::canonicalize(path).with_context(
    || {
      format!(
        "failed to resolve {}",
        path.display()
      )
    }
  )
}

/// Drops a trailing `# comment`. Values
/// may not contain `#`.
fn strip_comment(raw: &str) -> &str {
  raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim()
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rcfile_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RCFILE_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    return Ok(None);
  };
  let candidate = home.join(".dottimerc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".dottime"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

pub(crate) fn parse_bool(
  s: &str
) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
