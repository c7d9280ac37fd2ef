use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ColorChoice, Command,
};

fn email_arg() -> Arg {
    Arg::new("email")
        .long("email")
        .short('e')
        .help("Account email address")
        .env("CLIENT_EMAIL")
        .required(true)
}

fn password_arg(name: &'static str, env: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .help("Password (prefer the environment variable over the flag)")
        .env(env)
        .hide_env_values(true)
        .required(true)
}

fn code_arg() -> Arg {
    Arg::new("code")
        .long("code")
        .short('c')
        .help("6-digit code from the reset email")
        .required(true)
}

/// Form fields shared by `cover-letter generate` and `cover-letter save`.
fn letter_form_args() -> [Arg; 5] {
    [
        Arg::new("full-name")
            .long("full-name")
            .short('n')
            .required(true),
        Arg::new("job-title")
            .long("job-title")
            .short('t')
            .required(true),
        Arg::new("company")
            .long("company")
            .short('c')
            .required(true),
        Arg::new("qualifications")
            .long("qualifications")
            .short('q')
            .default_value(""),
        Arg::new("job-description-url")
            .long("job-description-url")
            .help("Link to an uploaded job description"),
    ]
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("client")
        .about("Resume and cover-letter account client")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg(
            Arg::new("api")
                .long("api")
                .help("Backend base URL, overrides API_BASE_URL")
                .global(true),
        )
        .subcommand(
            Command::new("login")
                .about("Sign in with email and password")
                .arg(email_arg())
                .arg(password_arg("password", "CLIENT_PASSWORD")),
        )
        .subcommand(
            Command::new("register")
                .about("Create an account")
                .arg(
                    Arg::new("username")
                        .long("username")
                        .short('u')
                        .required(true),
                )
                .arg(
                    Arg::new("full-name")
                        .long("full-name")
                        .short('n')
                        .required(true),
                )
                .arg(email_arg())
                .arg(password_arg("password", "CLIENT_PASSWORD")),
        )
        .subcommand(Command::new("logout").about("End the current session"))
        .subcommand(
            Command::new("whoami")
                .about("Show the active identity")
                .arg(
                    Arg::new("refresh")
                        .long("refresh")
                        .help("Fetch the profile from the backend")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("check-email")
                .about("Check whether an account exists")
                .arg(email_arg()),
        )
        .subcommand(
            Command::new("forgot-password")
                .about("Email a password reset code")
                .arg(email_arg()),
        )
        .subcommand(
            Command::new("verify-code")
                .about("Verify a password reset code")
                .arg(email_arg())
                .arg(code_arg()),
        )
        .subcommand(
            Command::new("reset-password")
                .about("Set a new password with a verified code")
                .arg(email_arg())
                .arg(code_arg())
                .arg(password_arg("new-password", "CLIENT_NEW_PASSWORD")),
        )
        .subcommand(
            Command::new("cover-letter")
                .about("Generate, save or list cover letters")
                .subcommand_required(true)
                .subcommand(
                    Command::new("generate")
                        .about("Generate a cover letter")
                        .args(letter_form_args()),
                )
                .subcommand(
                    Command::new("save")
                        .about("Save a letter, edited or as generated")
                        .args(letter_form_args())
                        .arg(
                            Arg::new("letter-file")
                                .long("letter-file")
                                .short('f')
                                .help("File holding the final letter text")
                                .required(true),
                        ),
                )
                .subcommand(Command::new("list").about("List saved cover letters")),
        )
}
