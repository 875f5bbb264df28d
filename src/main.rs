use anyhow::Result;
use appgrid::config::{load_config, load_config_from};
use appgrid::service::Service;
use appgrid::sources::DesktopFileParser;
use appgrid::watcher::NotifyWatcher;
use calloop::EventLoop;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Position and folder scope
    #[arg(short, long)]
    scope: Option<String>,

    /// Descriptor directory (repeatable); replaces the configured list
    #[arg(short, long = "directory")]
    directories: Vec<PathBuf>,

    /// Extra icon directory (repeatable); replaces the configured list
    #[arg(short, long = "icon-directory")]
    icon_directories: Vec<PathBuf>,

    /// Only show entries in these categories (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,

    /// Print the folder tree after the initial scan and exit
    #[arg(long)]
    dump: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if args.scope.is_some() {
        config.general.scope = args.scope.clone();
    }
    if !args.directories.is_empty() {
        config.directories.applications = args.directories.clone();
    }
    if !args.icon_directories.is_empty() {
        config.directories.icons = args.icon_directories.clone();
    }
    if !args.categories.is_empty() {
        config.general.categories = args.categories.clone();
    }

    let mut event_loop: EventLoop<Service<NotifyWatcher>> = EventLoop::try_new()?;
    let (tx, rx) = calloop::channel::channel::<notify::Event>();
    let watcher = NotifyWatcher::new(tx)?;

    let mut service = Service::new(
        event_loop.handle(),
        config,
        watcher,
        Box::new(DesktopFileParser::from_env()),
    );
    service.start();

    if args.dump {
        print!("{}", service.dump());
        return Ok(());
    }

    event_loop
        .handle()
        .insert_source(rx, |event, _, service: &mut Service<NotifyWatcher>| {
            if let calloop::channel::Event::Msg(event) = event {
                service.on_fs_event(event);
            }
        })
        .map_err(|e| e.error)?;

    loop {
        event_loop.dispatch(None, &mut service)?;
    }
}
