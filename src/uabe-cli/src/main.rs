mod cli;
mod commands;
mod config;
mod file_io;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uabe::codec::CancelFlag;

use cli::*;

fn init_tracing(verbose: bool) {
    let default = if verbose { "uabe=debug" } else { "uabe=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Info { input, json } => commands::bundle::info(&input, json),

        Commands::Objects { bundle, class, json } => {
            commands::object::objects(&bundle, class.as_deref(), json)
        }

        Commands::Dump {
            bundle,
            path_id,
            field,
            output,
        } => commands::object::dump(&bundle, path_id, field.as_deref(), output.as_deref()),

        Commands::Set {
            bundle,
            out,
            path_id,
            assignments,
        } => commands::object::set(&bundle, &out, path_id, &assignments),

        Commands::ImportJson {
            bundle,
            out,
            path_id,
            json,
        } => commands::object::import_json(&bundle, &out, path_id, &json),

        Commands::ExportText {
            bundle,
            path_id,
            output,
        } => commands::text::export_text(&bundle, path_id, output.as_deref()),

        Commands::ImportText {
            bundle,
            out,
            path_id,
            file,
        } => commands::text::import_text(&bundle, &out, path_id, &file),

        Commands::ExportTexture {
            bundle,
            path_id,
            output,
            mip,
        } => commands::texture::export_texture(&bundle, path_id, &output, mip),

        Commands::ImportTexture {
            bundle,
            out,
            path_id,
            image,
            format,
            mipmaps,
        } => commands::texture::import_texture(
            &bundle,
            &out,
            path_id,
            &image,
            format.as_deref(),
            mipmaps,
        ),

        Commands::ExportTextures { bundle, output } => {
            let cancel = CancelFlag::new();
            let on_interrupt = cancel.clone();
            ctrlc::set_handler(move || {
                tracing::warn!("Interrupted, finishing textures already in progress");
                on_interrupt.cancel();
            })
            .map_err(|e| anyhow::anyhow!("Failed to set signal handler: {}", e))?;
            commands::texture::export_textures(&bundle, &output, &cancel)
        }

        Commands::Repack {
            input,
            output,
            compression,
            block_size,
        } => commands::bundle::repack(&input, &output, compression, block_size),

        Commands::Configure {
            compression,
            block_size,
            texture_format,
            show,
        } => commands::configure::handle(compression, block_size, texture_format, show),
    }
}
