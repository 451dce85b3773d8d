use std::process;
use std::sync::Arc;

use log::{
    error,
    info,
};
use tiny_http::Server;

use scriv::config::Config;
use scriv::repo::{
    GitRepository,
    Store,
};
use scriv::request::EditServer;
use scriv::serve::StaticTree;
use scriv::server::{
    run,
    Router,
};

mod arg;
use arg::Settings;

fn fail(msg: String) -> ! {
    error!("{}", msg);
    process::exit(1);
}

fn main() {
    env_logger::init();

    let settings = match Settings::from_args() {
        Ok(v) => v,
        Err(e) => fail(e),
    };

    let cfg = match Config::load(&settings.config) {
        Ok(v) => v,
        Err(e) => fail(e.to_string()),
    };
    if cfg.users.is_empty() {
        fail(format!("no users in {:?}", settings.config));
    }

    let repo = match GitRepository::open_or_init(&settings.root) {
        Ok(v) => v,
        Err(e) => fail(format!("cannot open repository at {:?}: {}", settings.root, e)),
    };
    info!("using repository at {:?}", repo.root());

    let edit = EditServer::new(&settings.root, &settings.mount, &settings.edit, &cfg, Store::new(Box::new(repo)));
    let ace = settings.ace.as_deref().map(StaticTree::new);
    let router = Router::new(edit, StaticTree::new(&settings.root), ace);

    let addr = format!("{}:{}", settings.host, settings.port);
    let srv = match Server::http(&addr) {
        Ok(v) => v,
        Err(e) => fail(format!("cannot bind {}: {}", addr, e)),
    };
    info!("listening on {}, edit mount {}", addr, settings.mount);

    run(Arc::new(srv), Arc::new(router), settings.threads);
}
