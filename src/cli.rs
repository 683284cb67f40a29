use std::path::PathBuf;

use clap::Parser;

use media_range::config::Config;

#[derive(Parser)]
#[command(name = "media-range")]
#[command(author, version, about = "Serve a media file over HTTP with range request support")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of accept workers (defaults to the number of CPUs)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Media file to serve
    #[arg(short, long)]
    pub media: Option<PathBuf>,

    /// Request path the media is served on
    #[arg(long)]
    pub route: Option<String>,

    /// Content type sent with the media, guessed from its extension if unset
    #[arg(long)]
    pub content_type: Option<String>,
}

impl Cli {
    /// Overrides config file values with whatever was given on the command line.
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(workers) = self.workers {
            config.server.workers = Some(workers);
        }
        if let Some(media) = &self.media {
            config.media.path = media.clone();
        }
        if let Some(route) = &self.route {
            config.media.route = route.clone();
        }
        if let Some(content_type) = &self.content_type {
            config.media.content_type = Some(content_type.clone());
        }
    }
}
