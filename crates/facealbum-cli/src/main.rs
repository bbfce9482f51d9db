use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use facealbum_core::compress::Compressor;
use facealbum_core::matcher::{FaceKey, MatchSet};
use facealbum_core::publish;
use facealbum_core::store::GalleryFilter;
use facealbum_core::{AlbumWorkspace, CorpusEntry, GallerySearch, SharedDetector, StagedPhoto};
use facealbum_store::HttpStore;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod sidecar;

use config::Config;
use sidecar::SidecarDetector;

#[derive(Parser)]
#[command(name = "facealbum", about = "Curate face-annotated albums and find yourself in the gallery")]
struct Cli {
    /// TOML config file (defaults to $FACEALBUM_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect and crop faces in a batch of photos
    Curate {
        #[arg(long)]
        title: String,
        /// Album date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// Match every curated face against known people
        #[arg(long)]
        review: bool,
        /// Compress and upload the album
        #[arg(long)]
        save: bool,
        /// Photos to process (at most 10)
        #[arg(required = true)]
        photos: Vec<PathBuf>,
    },
    /// Find gallery photos of you, or of the person in --photo
    Search {
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// Browse the gallery one page at a time
    Gallery {
        /// Zero-based page number
        #[arg(long, default_value_t = 0)]
        page: usize,
    },
    /// List album titles
    Titles,
    /// Filter the gallery by title and date range
    Filter {
        #[arg(long = "title")]
        titles: Vec<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Compress a photo the way it is prepared for upload
    Compress { input: PathBuf, output: PathBuf },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let store = HttpStore::new(config.api_url.clone())
        .with_descriptor_model(config.descriptor_model.clone());
    let search = GallerySearch::new(&store, config.search());

    match cli.command {
        Commands::Curate {
            title,
            date,
            review,
            save,
            photos,
        } => {
            let detector = SharedDetector::load(|| {
                anyhow::Ok(SidecarDetector::new(config.descriptor_model.clone()))
            })?;
            let mut workspace = AlbumWorkspace::new(config.curate());
            workspace.set_title(title);
            workspace.set_date(date);
            workspace.add_images(read_photos(&photos)?)?;

            let album_id = workspace.process(&detector).await?;
            if let Some(album) = workspace.album(album_id) {
                if cli.json {
                    print_json(&album_summary(album))?;
                } else {
                    print_album(album);
                }
            }

            if review {
                let matches = search.review_albums(workspace.albums()).await?;
                print_matches(&matches, cli.json)?;
            }

            if save {
                let compressor = Compressor::new(config.compress());
                let ack = publish::save_album(&mut workspace, album_id, &store, &compressor)
                    .await?;
                if cli.json {
                    print_json(&ack)?;
                } else {
                    println!("Album saved.");
                }
            }
        }
        Commands::Search { photo } => {
            let result = match photo {
                Some(path) => {
                    let detector = SharedDetector::load(|| {
                        anyhow::Ok(SidecarDetector::new(config.descriptor_model.clone()))
                    })?;
                    let query = read_photo(&path)?;
                    search.by_query_photo(&detector, &query).await?
                }
                None => {
                    let Some(token) = config.auth_token.as_deref() else {
                        bail!("no auth token configured; set FACEALBUM_TOKEN or pass --photo");
                    };
                    search.by_user_embedding(token).await?
                }
            };
            if result.photos.is_empty() && !cli.json {
                println!("Sorry, no matches found.");
            } else {
                print_entries(&result.photos, cli.json)?;
            }
            if result.skipped > 0 {
                tracing::warn!(skipped = result.skipped, "some stored descriptors were not comparable");
            }
        }
        Commands::Gallery { page } => {
            let browse = search.browse(page).await?;
            if cli.json {
                print_json(&serde_json::json!({
                    "page": browse.page,
                    "images": browse.entries,
                    "has_more": browse.has_more,
                }))?;
            } else {
                print_entries(&browse.entries, false)?;
                if browse.has_more {
                    println!("More photos on page {}.", browse.page + 1);
                } else {
                    println!("No more photos.");
                }
            }
        }
        Commands::Titles => {
            let titles = search.titles().await?;
            if cli.json {
                print_json(&titles)?;
            } else {
                for title in titles {
                    println!("{title}");
                }
            }
        }
        Commands::Filter { titles, from, to } => {
            let filter = GalleryFilter {
                titles,
                date_from: from,
                date_to: to,
            };
            let entries = search.filter(&filter).await?;
            print_entries(&entries, cli.json)?;
        }
        Commands::Compress { input, output } => {
            let data = std::fs::read(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let compressed = Compressor::new(config.compress()).compress_bytes(&data)?;
            std::fs::write(&output, &compressed.bytes)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "{} -> {} ({}x{}, {} bytes, quality {:.2}{})",
                input.display(),
                output.display(),
                compressed.width,
                compressed.height,
                compressed.bytes.len(),
                compressed.quality,
                if compressed.used_fallback { ", fallback" } else { "" }
            );
        }
    }

    Ok(())
}

fn read_photo(path: &Path) -> Result<StagedPhoto> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(StagedPhoto::new(path.to_string_lossy(), data))
}

fn read_photos(paths: &[PathBuf]) -> Result<Vec<StagedPhoto>> {
    paths.iter().map(|p| read_photo(p)).collect()
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn album_summary(album: &facealbum_core::Album) -> serde_json::Value {
    serde_json::json!({
        "id": album.id,
        "title": album.title,
        "date": album.date,
        "images": album.images.iter().map(|image| serde_json::json!({
            "file": image.file_name,
            "type": image.kind,
            "faces": image.faces.iter().map(|f| serde_json::json!({
                "score": f.score,
                "region": f.region,
            })).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
    })
}

fn print_album(album: &facealbum_core::Album) {
    println!(
        "Album {} \"{}\" ({}): {} images, {} faces",
        album.id,
        album.title,
        album.date,
        album.images.len(),
        album.face_count()
    );
    for (i, image) in album.images.iter().enumerate() {
        println!("  [{i}] {} {} ({} faces)", image.file_name, image.kind, image.faces.len());
        for (j, face) in image.faces.iter().enumerate() {
            let r = face.region;
            println!(
                "      face {j}: score {:.3} at {},{} {}x{}",
                face.score, r.x, r.y, r.width, r.height
            );
        }
    }
}

fn print_matches(matches: &MatchSet<FaceKey>, json: bool) -> Result<()> {
    let mut rows: Vec<(&FaceKey, &[String])> = matches.iter().collect();
    rows.sort_by_key(|(key, _)| (key.album, key.image, key.face));

    if json {
        let value: Vec<serde_json::Value> = rows
            .iter()
            .map(|(key, refs)| serde_json::json!({ "face": key.to_string(), "matches": refs }))
            .collect();
        return print_json(&value);
    }

    if rows.is_empty() {
        println!("No known people matched.");
    }
    for (key, refs) in rows {
        println!("image {} face {}:", key.image, key.face);
        for r in refs {
            println!("  {r}");
        }
    }
    Ok(())
}

fn print_entries(entries: &[CorpusEntry], json: bool) -> Result<()> {
    if json {
        return print_json(entries);
    }
    for entry in entries {
        match &entry.title {
            Some(title) => println!("{} ({title})", entry.reference),
            None => println!("{}", entry.reference),
        }
    }
    Ok(())
}
