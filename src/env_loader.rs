use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(digest_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(home) = digest_home {
        return Some(home.join(".env"));
    }
    Some(home_dir?.join("exception-digest/.env"))
}

/// `.env` in the working directory wins; otherwise the one next to the digest home.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("EXDIGEST_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::fallback_dotenv_path;
    use std::path::PathBuf;

    #[test]
    fn digest_home_holds_its_own_env_file() {
        let got = fallback_dotenv_path(
            Some(PathBuf::from("/srv/digest")),
            Some(PathBuf::from("/home/ops")),
        );
        assert_eq!(got, Some(PathBuf::from("/srv/digest/.env")));
    }

    #[test]
    fn fallback_uses_default_home_layout() {
        let got = fallback_dotenv_path(None, Some(PathBuf::from("/home/ops")));
        assert_eq!(got, Some(PathBuf::from("/home/ops/exception-digest/.env")));
    }

    #[test]
    fn no_home_means_no_fallback() {
        assert_eq!(fallback_dotenv_path(None, None), None);
    }
}
