use anyhow::Result;
use clap::Subcommand;
use snippets_auth::{
    AuthError, ChangePasswordData, GoogleRegisterData, LoginData, RegisterData, SessionManager,
};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
    },
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
    },
    /// Forget the stored session
    Logout,
    /// Show whether a session is stored
    Status,
    /// Show the signed-in user's profile
    Whoami,
    /// Exchange the refresh token for a new pair
    Refresh,
    /// Change the account password
    ChangePassword,
    /// Open the Google sign-in page in the browser
    GoogleLogin,
    /// Finish a Google sign-up with the registration token from the redirect
    GoogleComplete {
        #[arg(long)]
        token: String,
    },
    /// Store the tokens carried by an OAuth callback URL or fragment
    Callback { fragment: String },
}

pub async fn run(command: Command, session: &SessionManager) -> Result<()> {
    let observer = session.clone();
    let subscription = session.subscribe(move || {
        tracing::info!(
            authenticated = observer.is_authenticated(),
            "Session state changed"
        );
    });

    let result = execute(command, session).await;
    subscription.unsubscribe();
    result
}

async fn execute(command: Command, session: &SessionManager) -> Result<()> {
    match command {
        Command::Login { email } => {
            let password = rpassword::prompt_password("Password: ")?;
            session
                .login(&LoginData { email, password })
                .await
                .map_err(report)?;
            println!("✓ Logged in");
        }
        Command::Register { email, username } => {
            let password = rpassword::prompt_password("Password: ")?;
            let confirm_password = rpassword::prompt_password("Confirm password: ")?;
            let registration = session
                .register(&RegisterData {
                    email,
                    username,
                    password,
                    confirm_password,
                })
                .await
                .map_err(report)?;
            if registration.token.is_some() {
                println!("✓ Account created, you are logged in");
            } else {
                println!("✓ Account created, log in to continue");
            }
        }
        Command::Logout => {
            session.logout()?;
            println!("✓ Logged out");
        }
        Command::Status => {
            if session.is_authenticated() {
                println!("Logged in");
            } else {
                println!("Not logged in");
            }
        }
        Command::Whoami => {
            let user = session.get_current_user().await.map_err(report)?;
            println!(
                "{} <{}> (id {}, joined {}{})",
                user.username,
                user.email,
                user.id,
                user.created_at.format("%Y-%m-%d"),
                if user.is_active { "" } else { ", inactive" }
            );
        }
        Command::Refresh => {
            session.refresh().await.map_err(report)?;
            println!("✓ Token refreshed");
        }
        Command::ChangePassword => {
            let old_password = rpassword::prompt_password("Current password: ")?;
            let new_password = rpassword::prompt_password("New password: ")?;
            let confirm_new_password = rpassword::prompt_password("Confirm new password: ")?;
            session
                .change_password(&ChangePasswordData {
                    old_password,
                    new_password,
                    confirm_new_password,
                })
                .await
                .map_err(report)?;
            println!("✓ Password updated");
        }
        Command::GoogleLogin => {
            let url = session.google_login_url();
            if let Err(e) = open::that(&url) {
                eprintln!("Failed to open browser automatically: {}", e);
                eprintln!("\nPlease open this URL in your browser:");
            } else {
                println!("Browser opened. You can also open this URL directly:");
            }
            println!("{}\n", url);
            println!("When the browser lands on the callback page, run:");
            println!("  snippets callback '<callback url>'");
        }
        Command::GoogleComplete { token } => {
            let password = rpassword::prompt_password("Choose a password: ")?;
            let confirm_password = rpassword::prompt_password("Confirm password: ")?;
            session
                .complete_google_registration(&GoogleRegisterData {
                    password,
                    confirm_password,
                    registration_token: token,
                })
                .await
                .map_err(report)?;
            println!("✓ Google account linked, you are logged in");
        }
        Command::Callback { fragment } => {
            session.complete_oauth_callback(&fragment).map_err(report)?;
            println!("✓ Logged in");
        }
    }

    Ok(())
}

/// Print field-level messages the way the web forms show them inline
fn report(err: AuthError) -> anyhow::Error {
    if matches!(
        err,
        AuthError::ValidationFailed(_) | AuthError::InvalidCredentials(_)
    ) {
        for message in err.messages() {
            eprintln!("  - {}", message);
        }
    }
    err.into()
}
