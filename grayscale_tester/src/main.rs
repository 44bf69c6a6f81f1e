mod config;

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use bitmap_locker::{DynamicImageHandle, grayscale, with_locked};
use futures::future::join_all;
use image::{DynamicImage, ImageFormat};
use log::{error, info};
use tokio::sync::Semaphore;

use config::{Job, TesterConfig, USAGE, WORKERS_ENV};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // --- 1. Argument Parsing & Setup ---
    let config = match TesterConfig::from_args(env::args().skip(1), env::var(WORKERS_ENV).ok()) {
        Ok(config) => config,
        Err(err) => {
            println!("{err:#}");
            println!("{USAGE}");
            return Ok(());
        }
    };
    info!(
        "converting {} image(s) with up to {} worker(s)",
        config.jobs.len(),
        config.workers
    );

    // --- 2. Concurrent Conversions ---
    // Each conversion is CPU-bound, so it runs on the blocking pool; the
    // semaphore keeps at most `workers` of them in flight.
    let permits = Arc::new(Semaphore::new(config.workers));
    let total = config.jobs.len();
    let conversions = config.jobs.into_iter().map(|job| {
        let permits = Arc::clone(&permits);
        async move {
            let _permit = permits.acquire_owned().await?;
            let label = job.input.display().to_string();
            let elapsed = tokio::task::spawn_blocking(move || convert(&job))
                .await
                .with_context(|| format!("conversion task for {label} panicked"))??;
            Ok::<_, anyhow::Error>((label, elapsed))
        }
    });

    // --- 3. Report ---
    let mut failures = 0usize;
    for outcome in join_all(conversions).await {
        match outcome {
            Ok((label, elapsed)) => println!("{label}: {}", elapsed.as_secs_f64()),
            Err(err) => {
                error!("{err:#}");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {total} conversion(s) failed");
    }
    Ok(())
}

/// Loads `job.input`, grays it in place and saves it to `job.output`.
/// Returns the time spent locking, transforming and releasing.
fn convert(job: &Job) -> anyhow::Result<Duration> {
    let image = image::open(&job.input)
        .with_context(|| format!("failed to load {}", job.input.display()))?;
    let handle = DynamicImageHandle::new(image);

    let watch = Instant::now();
    with_locked(&handle, |buffer| grayscale(buffer))
        .with_context(|| format!("failed to transform {}", job.input.display()))?;
    let elapsed = watch.elapsed();

    save(handle.into_inner(), &job.output)?;
    Ok(elapsed)
}

/// Saves `image` in the format implied by the extension of `path`. Encoders
/// without alpha support (JPEG) get the image flattened to RGB first.
fn save(image: DynamicImage, path: &Path) -> anyhow::Result<()> {
    let format = ImageFormat::from_path(path)
        .with_context(|| format!("cannot tell the image format of {}", path.display()))?;
    let image = match format {
        ImageFormat::Jpeg if image.color().has_alpha() => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image,
    };
    image
        .save_with_format(path, format)
        .with_context(|| format!("failed to save {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn scratch_path(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(format!("grayscale_tester_{}_{name}", std::process::id()))
    }

    #[test]
    fn converts_a_png_file() {
        let input = scratch_path("in.png");
        let output = scratch_path("out.png");
        let mut source = RgbImage::new(2, 1);
        source.put_pixel(0, 0, Rgb([30, 60, 90]));
        source.put_pixel(1, 0, Rgb([255, 255, 255]));
        source.save(&input).expect("Error Saving File.");

        let job = Job {
            input: input.clone(),
            output: output.clone(),
        };
        convert(&job).expect("conversion");

        let result = image::open(&output).expect("Error Loading File.").to_rgb8();
        assert_eq!(result.get_pixel(0, 0), &Rgb([60, 60, 60]));
        assert_eq!(result.get_pixel(1, 0), &Rgb([255, 255, 255]));

        let _ = std::fs::remove_file(input);
        let _ = std::fs::remove_file(output);
    }

    #[test]
    fn missing_input_is_an_error() {
        let job = Job {
            input: scratch_path("does_not_exist.png"),
            output: scratch_path("never_written.png"),
        };
        assert!(convert(&job).is_err());
    }
}
