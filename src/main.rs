use peadb::aof::load_append_only_file;
use peadb::config::Config;
use peadb::net;
use peadb::rdb::load_snapshot;
use peadb::server::{init_server, SERVER};
use peadb::util::{log, LogLevel};
use std::{env, process::exit, thread, time::Instant};

fn main() {
    let args: Vec<String> = env::args().collect();

    let config = if args.len() == 2 {
        match Config::load_file(&args[1]) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{}", e);
                exit(1);
            }
        }
    } else if args.len() > 2 {
        eprintln!("Usage: ./peadb-server [/path/to/peadb.conf]");
        exit(1);
    } else {
        log(LogLevel::Warning, LogLevel::Notice, &None, "no config file specified, using the default config. In order to specify a config file use './peadb-server /path/to/peadb.conf'");
        Config::default()
    };

    let verbosity = config.verbosity;
    let logfile = config.logfile.clone();
    let port = config.port;
    let bind_addr = config.bind_addr.clone();
    let append_only = config.append_only;
    let append_filename = config.append_filename.clone();
    let db_filename = config.db_filename.clone();
    let dir = config.dir.clone();
    let dbnum = config.dbnum;

    init_server(config);

    let start = Instant::now();
    if append_only {
        let path = format!("{}/{}", dir, append_filename);
        let mut server = SERVER.lock().unwrap();
        match load_append_only_file(&mut server, &path) {
            Ok(n) if n > 0 => log(LogLevel::Notice, verbosity, &logfile, &format!("DB loaded from append only file: {} commands in {} seconds", n, start.elapsed().as_secs())),
            Ok(_) => {}
            Err(e) => {
                log(LogLevel::Warning, verbosity, &logfile, &format!("Fatal error loading append only file: {}", e));
                exit(1);
            }
        }
    } else {
        let path = format!("{}/{}", dir, db_filename);
        match load_snapshot(&path, dbnum) {
            Ok(keyspace) => {
                let mut server = SERVER.lock().unwrap();
                server.keyspace = keyspace;
                log(LogLevel::Notice, verbosity, &logfile, &format!("DB loaded from disk: {} seconds", start.elapsed().as_secs()));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log(LogLevel::Warning, verbosity, &logfile, &format!("Error loading RDB file, starting empty: {}", e)),
        }
    }

    let listener = match net::tcp_server(port, &bind_addr) {
        Ok(l) => l,
        Err(e) => {
            log(LogLevel::Warning, verbosity, &logfile, &format!("Could not create server TCP listening socket {}:{}: {}", bind_addr, port, e));
            exit(1);
        }
    };

    spawn_cron();

    log(LogLevel::Notice, verbosity, &logfile, &format!("The server is now ready to accept connections on port {}", port));
    net::serve(listener);
}

fn spawn_cron() {
    thread::spawn(|| loop {
        let interval_ms = peadb::server::cron_tick();
        thread::sleep(std::time::Duration::from_millis(interval_ms));
    });
}
