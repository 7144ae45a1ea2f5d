pub mod core {
    pub mod config;
    pub mod error;
    pub mod poller;
    pub mod tracing_init;
}

pub mod api {
    pub mod plex;
    pub mod qbittorrent;
}

pub mod models {
    pub mod policy;
    pub mod session;
}

pub mod utils {
    pub mod units;
}
