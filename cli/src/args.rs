use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use humantime::parse_duration;

use crate::Config;

const DESCRIPTION: &str = concat!(
    "Uploads a file to Cloud Storage through a V4 signed PUT URL,",
    " then downloads it back through a signed GET URL.",
    " Signing uses the private key of a service account key file."
);

/// Command line options, each with an environment variable fallback.
#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = DESCRIPTION)]
pub struct Args {
    /// The service account key file.
    ///
    /// When unset, `GOOGLE_APPLICATION_CREDENTIALS_JSON`, then `GOOGLE_APPLICATION_CREDENTIALS`,
    /// then the gcloud well known file are tried.
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// The bucket holding the object.
    #[arg(long, env = "PRESIGN_BUCKET")]
    pub bucket: String,

    /// The local file to upload.
    #[arg(long, env = "PRESIGN_UPLOAD_FILE")]
    pub upload_file: PathBuf,

    /// Where the downloaded object is written. Created or overwritten.
    #[arg(long, env = "PRESIGN_DOWNLOAD_FILE")]
    pub download_file: PathBuf,

    /// Lifetime of the signed URLs, at most seven days.
    #[arg(long, env = "PRESIGN_EXPIRES", value_parser = parse_duration, default_value = "1h")]
    pub expires: Duration,

    /// Extension appended to the generated object name.
    #[arg(long, env = "PRESIGN_EXTENSION", default_value = ".jpeg")]
    pub extension: String,

    /// Content type bound into the upload URL.
    #[arg(long, env = "PRESIGN_CONTENT_TYPE")]
    pub content_type: Option<String>,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            credentials: args.credentials,
            bucket: args.bucket,
            upload_file: args.upload_file,
            download_file: args.download_file,
            expires: args.expires,
            extension: args.extension,
            content_type: args.content_type,
        }
    }
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;
    use std::time::Duration;

    use clap::Parser;
    use serial_test::serial;

    use crate::args::Args;
    use crate::Config;

    const VARS: [(&str, Option<&str>); 7] = [
        ("GOOGLE_APPLICATION_CREDENTIALS", None),
        ("PRESIGN_BUCKET", None),
        ("PRESIGN_UPLOAD_FILE", None),
        ("PRESIGN_DOWNLOAD_FILE", None),
        ("PRESIGN_EXPIRES", None),
        ("PRESIGN_EXTENSION", None),
        ("PRESIGN_CONTENT_TYPE", None),
    ];

    #[test]
    #[serial]
    fn test_defaults() {
        temp_env::with_vars(VARS, || {
            let args = Args::try_parse_from([
                "presign",
                "--bucket",
                "bucket",
                "--upload-file",
                "in.jpeg",
                "--download-file",
                "out.jpeg",
            ])
            .unwrap();
            let config = Config::from(args);
            assert_eq!(config.credentials, None);
            assert_eq!(config.bucket, "bucket");
            assert_eq!(config.upload_file, PathBuf::from("in.jpeg"));
            assert_eq!(config.download_file, PathBuf::from("out.jpeg"));
            assert_eq!(config.expires, Duration::from_secs(3600));
            assert_eq!(config.extension, ".jpeg");
            assert_eq!(config.content_type, None);
        });
    }

    #[test]
    #[serial]
    fn test_environment_fallback() {
        let mut vars = VARS;
        // left to the credential search so that GOOGLE_APPLICATION_CREDENTIALS_JSON keeps precedence
        vars[0].1 = Some("/etc/presign/key.json");
        vars[1].1 = Some("env-bucket");
        vars[2].1 = Some("in.png");
        vars[3].1 = Some("out.png");
        vars[4].1 = Some("15m");
        vars[6].1 = Some("image/png");
        temp_env::with_vars(vars, || {
            let args = Args::try_parse_from(["presign", "--extension", "png"]).unwrap();
            let config = Config::from(args);
            assert_eq!(config.credentials, None);
            assert_eq!(config.bucket, "env-bucket");
            assert_eq!(config.expires, Duration::from_secs(900));
            assert_eq!(config.extension, "png");
            assert_eq!(config.content_type.as_deref(), Some("image/png"));
        });
    }

    #[test]
    #[serial]
    fn test_credentials_flag() {
        temp_env::with_vars(VARS, || {
            let args = Args::try_parse_from([
                "presign",
                "--credentials",
                "key.json",
                "--bucket",
                "b",
                "--upload-file",
                "a",
                "--download-file",
                "b",
            ])
            .unwrap();
            assert_eq!(Config::from(args).credentials, Some(PathBuf::from("key.json")));
        });
    }

    #[test]
    #[serial]
    fn test_missing_bucket() {
        temp_env::with_vars(VARS, || {
            let result = Args::try_parse_from(["presign", "--upload-file", "a", "--download-file", "b"]);
            assert!(result.is_err());
        });
    }

    #[test]
    #[serial]
    fn test_invalid_expires() {
        temp_env::with_vars(VARS, || {
            let result = Args::try_parse_from([
                "presign",
                "--bucket",
                "b",
                "--upload-file",
                "a",
                "--download-file",
                "b",
                "--expires",
                "soon",
            ]);
            assert!(result.is_err());
        });
    }
}
