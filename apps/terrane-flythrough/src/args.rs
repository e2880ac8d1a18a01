//! Command line options.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use terrane_core::{LodStrategy, TerrainSettings};

/// Options for a flythrough run.
#[derive(Debug, Clone)]
pub struct FlythroughArgs {
    pub frames: u64,
    pub render_distance: Option<u32>,
    pub levels: Option<u32>,
    pub layers: Option<usize>,
    pub seed: Option<u64>,
    pub eviction_seed: Option<u64>,
    pub async_generation: bool,
    pub strategy: Option<LodStrategy>,
    pub speed: f32,
    pub prewarm: bool,
    pub config: Option<PathBuf>,
    pub dump_patch: Option<PathBuf>,
    pub help: bool,
}

impl Default for FlythroughArgs {
    fn default() -> Self {
        Self {
            frames: 600,
            render_distance: None,
            levels: None,
            layers: None,
            seed: None,
            eviction_seed: None,
            async_generation: false,
            strategy: None,
            speed: 120.0,
            prewarm: false,
            config: None,
            dump_patch: None,
            help: false,
        }
    }
}

impl FlythroughArgs {
    /// Parse from the process arguments.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::parse(std::env::args().skip(1))
    }

    /// Parse from an argument list without the program name.
    pub fn parse<I, S>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Self::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("missing value for {name}"))
            };
            match arg.as_str() {
                "-h" | "--help" => out.help = true,
                "-n" | "--frames" => out.frames = parse_value(&arg, value(&arg)?)?,
                "--render-distance" => out.render_distance = Some(parse_value(&arg, value(&arg)?)?),
                "--levels" => out.levels = Some(parse_value(&arg, value(&arg)?)?),
                "--layers" => out.layers = Some(parse_value(&arg, value(&arg)?)?),
                "--seed" => out.seed = Some(parse_value(&arg, value(&arg)?)?),
                "--eviction-seed" => out.eviction_seed = Some(parse_value(&arg, value(&arg)?)?),
                "--speed" => out.speed = parse_value(&arg, value(&arg)?)?,
                "--async" => out.async_generation = true,
                "--prewarm" => out.prewarm = true,
                "--strategy" => {
                    out.strategy = Some(match value(&arg)?.as_str() {
                        "rings" | "nested-rings" => LodStrategy::NestedRings,
                        "quadtree" => LodStrategy::Quadtree,
                        other => bail!("unknown LOD strategy '{other}' (expected rings or quadtree)"),
                    });
                }
                "-c" | "--config" => out.config = Some(PathBuf::from(value(&arg)?)),
                "--dump-patch" => out.dump_patch = Some(PathBuf::from(value(&arg)?)),
                other => bail!("unknown argument '{other}' (see --help)"),
            }
        }
        Ok(out)
    }

    /// Build terrain settings: the config file first, then flag overrides.
    pub fn settings(&self) -> anyhow::Result<TerrainSettings> {
        let mut settings = match &self.config {
            Some(path) => TerrainSettings::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => TerrainSettings::default(),
        };
        if let Some(seed) = self.seed {
            settings.seed = seed;
        }
        if let Some(rd) = self.render_distance {
            settings = settings.with_render_distance(rd);
        }
        if let Some(levels) = self.levels {
            settings = settings.with_level_count(levels);
        }
        if let Some(layers) = self.layers {
            settings = settings.with_layer_count(layers);
        }
        if let Some(strategy) = self.strategy {
            settings = settings.with_lod_strategy(strategy);
        }
        if let Some(seed) = self.eviction_seed {
            settings = settings.with_eviction_seed(seed);
        }
        if self.async_generation {
            settings = settings.with_async_generation(true);
        }
        Ok(settings)
    }
}

fn parse_value<T>(flag: &str, raw: String) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .with_context(|| format!("invalid value '{raw}' for {flag}"))
}
