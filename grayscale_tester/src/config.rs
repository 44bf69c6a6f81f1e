use std::path::PathBuf;

use anyhow::{Context, bail};

/// Environment variable that overrides the number of concurrent conversions.
pub const WORKERS_ENV: &str = "GT_WORKERS";

pub const USAGE: &str =
    "Usage: grayscale_tester <input_image_path> <output_image_path> [<input> <output> ...]";

/// One load -> grayscale -> save conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TesterConfig {
    pub jobs: Vec<Job>,
    /// Upper bound on conversions running at the same time.
    pub workers: usize,
}

impl TesterConfig {
    /// Builds the configuration from the arguments after the program name and
    /// the raw value of [`WORKERS_ENV`], if set.
    pub fn from_args<I>(args: I, workers: Option<String>) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let paths: Vec<String> = args.into_iter().collect();
        if paths.is_empty() || paths.len() % 2 != 0 {
            bail!("expected input/output path pairs, got {} argument(s)", paths.len());
        }
        let jobs = paths
            .chunks_exact(2)
            .map(|pair| Job {
                input: PathBuf::from(&pair[0]),
                output: PathBuf::from(&pair[1]),
            })
            .collect();

        let workers = match workers {
            Some(raw) => {
                let workers: usize = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{WORKERS_ENV} must be a positive integer, got {raw:?}"))?;
                if workers == 0 {
                    bail!("{WORKERS_ENV} must be at least 1");
                }
                workers
            }
            None => num_cpus::get().max(1),
        };

        Ok(Self { jobs, workers })
    }
}
