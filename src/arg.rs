use std::path::PathBuf;

use clap::{
    App,
    Arg,
    ArgMatches,
};

pub struct Settings {
    pub host: String,
    pub port: u16,
    pub threads: usize,
    pub config: PathBuf,
    pub root: PathBuf,
    pub edit: PathBuf,
    pub ace: Option<PathBuf>,
    pub mount: String,
}

const BIND_HOST: &str = "0.0.0.0";
const BIND_PORT: u16 = 8000;
const THREADS: usize = 4;
const CONFIG_FILE: &str = "config.json";
const ROOT_DIR: &str = "/www";
const EDIT_DIR: &str = "/edit";
const MOUNT: &str = "/edit";

impl Settings {

    pub fn new() -> Settings {
        Settings {
            host: BIND_HOST.to_string(),
            port: BIND_PORT,
            threads: THREADS,
            config: PathBuf::from(CONFIG_FILE),
            root: PathBuf::from(ROOT_DIR),
            edit: PathBuf::from(EDIT_DIR),
            ace: None,
            mount: MOUNT.to_string(),
        }
    }

    fn bind_from_args(&mut self, arg: &ArgMatches) -> Result<(), String> {
        if let Some(v) = arg.value_of("host") {
            self.host = v.to_string();
        }

        if let Some(v) = arg.value_of("port") {
            self.port = v.parse().map_err(|_| format!("invalid port {:?}", v))?;
        }

        if let Some(v) = arg.value_of("threads") {
            self.threads = v.parse().map_err(|_| format!("invalid thread count {:?}", v))?;
        }
        Ok(())
    }

    fn dirs_from_args(&mut self, arg: &ArgMatches) {
        if let Some(v) = arg.value_of("config") {
            self.config = PathBuf::from(v);
        }
        if let Some(v) = arg.value_of("root") {
            self.root = PathBuf::from(v);
        }
        if let Some(v) = arg.value_of("edit") {
            self.edit = PathBuf::from(v);
        }
        self.ace = arg.value_of("ace").map(PathBuf::from);
        if let Some(v) = arg.value_of("mount") {
            let mut s = v.trim_end_matches('/').to_string();
            if !s.starts_with('/') {
                s.insert(0, '/');
            }
            self.mount = s;
        }
    }

    pub fn from_args() -> Result<Settings, String> {
        let mut o = App::new("scriv");
        o = o.version(env!("CARGO_PKG_VERSION"));
        o = o.about("Edit pages over HTTP and record every change in git");
        o = o.arg(
            Arg::with_name("config")
                .long("config")
                .short("c")
                .value_name("JSON file with users, realm and commit author")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("root")
                .long("root")
                .value_name("Page tree and repository root")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("edit")
                .long("edit")
                .value_name("Tree served under the edit mount")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("ace")
                .long("ace")
                .value_name("Editor assets served without authentication")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("mount")
                .long("mount")
                .value_name("Path prefix of the edit namespace")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("host")
                .long("host")
                .value_name("Host or ip to bind server to.")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("port")
                .long("port")
                .short("p")
                .value_name("Port to bind server to")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("threads")
                .long("threads")
                .short("t")
                .value_name("Number of request worker threads")
                .takes_value(true)
                );

        let arg_matches = o.get_matches();
        let mut settings = Settings::new();
        settings.bind_from_args(&arg_matches)?;
        settings.dirs_from_args(&arg_matches);
        Ok(settings)
    }
}
