use std::{
    env::var,
    net::{Ipv6Addr, SocketAddr},
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

pub type Config = Arc<Configuration>;

pub struct Configuration {
    /// The address to listen on.
    pub listen_address: SocketAddr,
    // The port to listen on.
    pub app_port: u16,

    pub db_dsn: String,
    pub open_ai_key: String,
    pub open_ai_model: String,
    pub embedding_model: String,

    /// HS256 secret used to sign bearer tokens.
    pub jwt_secret: String,
    pub access_token_ttl: chrono::Duration,
    pub bcrypt_cost: u32,

    /// Directory generated PDFs are written to and served from.
    pub output_dir: PathBuf,

    pub generate_per_minute: u32,
    pub chat_per_minute: u32,
    pub request_timeout: Duration,
}

impl Configuration {
    pub fn new() -> Config {
        let app_port = var("PORT")
            .expect("Missing PORT environment variable")
            .parse::<u16>()
            .expect("Unable to parse the value of the PORT environment variable. Please make sure it is a valid unsigned 16-bit integer");

        let db_dsn = var("DATABASE_URL").expect("Missing DATABASE_URL environment variable");
        let open_ai_key =
            var("OPENAI_API_KEY").expect("Missing OPENAI_API_KEY environment variable");
        let jwt_secret = var("JWT_SECRET").expect("Missing JWT_SECRET environment variable");

        let open_ai_model = var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string());
        let embedding_model =
            var("EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-ada-002".to_string());
        let output_dir = var("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("generated_contracts"));

        let access_token_ttl = chrono::Duration::minutes(env_or("ACCESS_TOKEN_EXPIRE_MINUTES", 30));
        let bcrypt_cost = env_or("BCRYPT_COST", bcrypt::DEFAULT_COST);
        let generate_per_minute = env_or("GENERATE_RATE_PER_MINUTE", 5);
        let chat_per_minute = env_or("CHAT_RATE_PER_MINUTE", 10);
        let request_timeout = Duration::from_secs(env_or("REQUEST_TIMEOUT_SECS", 300));

        let listen_address = SocketAddr::from((Ipv6Addr::UNSPECIFIED, app_port));

        Arc::new(Configuration {
            listen_address,
            app_port,
            db_dsn,
            open_ai_key,
            open_ai_model,
            embedding_model,
            jwt_secret,
            access_token_ttl,
            bcrypt_cost,
            output_dir,
            generate_per_minute,
            chat_per_minute,
            request_timeout,
        })
    }
}

/// Reads an optional variable, falling back to `default` when it is unset.
/// A set but unparsable value is a startup error.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match var(name) {
        Ok(value) => value
            .parse()
            .unwrap_or_else(|_| panic!("Unable to parse the value of the {name} environment variable")),
        Err(_) => default,
    }
}
