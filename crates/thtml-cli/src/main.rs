use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thtml_engine::{Engine, RenderOptions, Source};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "thtml")]
#[command(about = "Render thtml templates to HTML")]
#[command(version)]
struct Cli {
    /// Log engine activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a template with a JSON context
    Render {
        /// Template file
        template: PathBuf,

        /// JSON file holding the context object
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// Write the output here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Reuse parsed templates across includes of the same content
        #[arg(long)]
        cache: bool,

        /// Wrap directive output in BEGIN/END comments
        #[arg(long)]
        debug: bool,
    },

    /// Parse a template and check it for errors without rendering
    Check {
        /// Template file
        template: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Render {
            template,
            context,
            output,
            cache,
            debug,
        } => {
            let options = RenderOptions::new().with_cache(cache).with_debug(debug);
            cmd_render(&template, context.as_deref(), output.as_deref(), options).await
        }
        Command::Check { template } => cmd_check(&template),
    }
}

/// `RUST_LOG` wins; otherwise warnings only, or debug with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn read_source(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => fail(format_args!("cannot read {}: {e}", path.display())),
    }
}

fn read_context(path: Option<&Path>) -> Value {
    let Some(path) = path else {
        return Value::Object(Default::default());
    };
    match serde_json::from_str::<Value>(&read_source(path)) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => fail(format_args!("{}: context must be a JSON object", path.display())),
        Err(e) => fail(format_args!("{}: {e}", path.display())),
    }
}

async fn cmd_render(
    template: &Path,
    context: Option<&Path>,
    output: Option<&Path>,
    options: RenderOptions,
) {
    let context = read_context(context);
    let html = match Engine::new()
        .render(Source::file(template), context, &options)
        .await
    {
        Ok(html) => html,
        Err(e) => fail(e),
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &html) {
                fail(format_args!("cannot write {}: {e}", path.display()));
            }
            eprintln!("Rendered: {}", path.display());
        }
        None => print!("{html}"),
    }
}

fn cmd_check(template: &Path) {
    let source = read_source(template);
    if let Err(e) = Engine::new().check(&source, Some(template)) {
        fail(e);
    }
    eprintln!("OK: {}", template.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_render_flags() {
        let cli = Cli::parse_from([
            "thtml", "render", "page.html", "--context", "ctx.json", "--debug", "-v",
        ]);
        assert!(cli.verbose);
        let Command::Render {
            template,
            context,
            output,
            cache,
            debug,
        } = cli.command
        else {
            panic!("expected the render subcommand");
        };
        assert_eq!(template, PathBuf::from("page.html"));
        assert_eq!(context, Some(PathBuf::from("ctx.json")));
        assert_eq!(output, None);
        assert!(!cache);
        assert!(debug);
    }
}
