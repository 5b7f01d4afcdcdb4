//! Command line and environment configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

/// End-to-end latency monitoring for Matrix.
///
/// Two accounts send a message back and forth in a fresh room; every round
/// trip is split into client -> server, server -> server and server -> client
/// time.
#[derive(Debug, Clone, Parser)]
#[command(version)]
pub struct Cli {
    /// Credentials for the first user, of the form @user:homeserver.org:password.
    #[arg(value_name = "USER1")]
    pub user_one: Credentials,

    /// Credentials for the second user, of the form @user:homeserver.org:password.
    #[arg(value_name = "USER2")]
    pub user_two: Credentials,

    /// Content of the messages sent back and forth.
    #[arg(short, long, default_value = "ping", env = "PINGPONG_MESSAGE_TEXT")]
    pub message_text: String,

    /// Time to wait before responding to a message.
    #[arg(short, long, default_value = "3s", value_parser = humantime::parse_duration, env = "PINGPONG_INTERVAL")]
    pub interval: Duration,

    /// Time to wait before retrying an operation if an error occurs.
    #[arg(short, long, default_value = "5s", value_parser = humantime::parse_duration, env = "PINGPONG_RETRY_INTERVAL")]
    pub retry_interval: Duration,

    /// Print a detailed log of every operation, instead of the default dashboard.
    #[arg(short, long, env = "PINGPONG_DEBUG")]
    pub debug: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("user credentials must be of the form @user:homeserver.org:password")]
pub struct CredentialsError;

/// `@user:homeserver:password`, split into its parts.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub homeserver: String,
    pub password: String,
}

impl Credentials {
    /// Fully qualified Matrix user id, `@user:homeserver`.
    pub fn user_id(&self) -> String {
        format!("@{}:{}", self.username, self.homeserver)
    }
}

impl FromStr for Credentials {
    type Err = CredentialsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(user), Some(homeserver), Some(password)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(CredentialsError);
        };
        let Some(username) = user.strip_prefix('@') else {
            return Err(CredentialsError);
        };

        Ok(Self {
            username: username.to_string(),
            homeserver: homeserver.to_string(),
            password: password.to_string(),
        })
    }
}

// Keeps passwords out of logs and panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("homeserver", &self.homeserver)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_credentials() {
        let credentials: Credentials = "@alice:matrix.org:s3cret".parse().expect("valid");
        assert_eq!(credentials.username, "alice");
        assert_eq!(credentials.homeserver, "matrix.org");
        assert_eq!(credentials.password, "s3cret");
        assert_eq!(credentials.user_id(), "@alice:matrix.org");
    }

    #[test]
    fn password_may_contain_colons() {
        let credentials: Credentials = "@bob:example.com:a:b:c".parse().expect("valid");
        assert_eq!(credentials.password, "a:b:c");
    }

    #[test]
    fn rejects_malformed_credentials() {
        for input in ["alice:matrix.org:pw", "@alice:matrix.org", "@alice", ""] {
            assert_eq!(input.parse::<Credentials>(), Err(CredentialsError), "{input}");
        }
    }

    #[test]
    fn debug_output_hides_password() {
        let credentials: Credentials = "@alice:matrix.org:s3cret".parse().expect("valid");
        assert!(!format!("{credentials:?}").contains("s3cret"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let cli = Cli::try_parse_from(["matrix-pingpong", "@a:x.org:p", "@b:y.org:q"])
            .expect("valid arguments");
        assert_eq!(cli.message_text, "ping");
        assert_eq!(cli.interval, Duration::from_secs(3));
        assert_eq!(cli.retry_interval, Duration::from_secs(5));
        assert!(!cli.debug);
    }

    #[test]
    fn options_are_parsed() {
        let cli = Cli::try_parse_from([
            "matrix-pingpong",
            "-m",
            "pong",
            "-i",
            "500ms",
            "-r",
            "1m",
            "-d",
            "@a:x.org:p",
            "@b:y.org:q",
        ])
        .expect("valid arguments");
        assert_eq!(cli.message_text, "pong");
        assert_eq!(cli.interval, Duration::from_millis(500));
        assert_eq!(cli.retry_interval, Duration::from_secs(60));
        assert!(cli.debug);
        assert_eq!(cli.user_two.user_id(), "@b:y.org");
    }

    #[test]
    fn malformed_credentials_fail_parsing() {
        let result = Cli::try_parse_from(["matrix-pingpong", "alice", "@b:y.org:q"]);
        assert!(result.is_err());
    }
}
