use argh::FromArgs;

#[derive(FromArgs)]
#[argh(description = "Interactive FTPS client. Every session, data connections included, is secured with TLS")]
pub struct Args {
    #[argh(switch, short = 'D', description = "enable TRACE log level")]
    pub debug: bool,
    #[argh(switch, short = 'v', description = "verbose mode")]
    pub verbose: bool,
    #[argh(switch, short = 'V', description = "print version")]
    pub version: bool,
    #[argh(switch, description = "use implicit FTPS instead of explicit")]
    pub implicit: bool,
    #[argh(
        switch,
        description = "don't verify the server certificate (the session is still encrypted)"
    )]
    pub insecure: bool,
    #[argh(option, short = 'p', description = "port to connect to")]
    pub port: Option<u16>,
    #[argh(positional, description = "host to connect to")]
    pub host: Option<String>,
}
