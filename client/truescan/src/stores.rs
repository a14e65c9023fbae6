use tokio::sync::watch;

#[derive(Debug)]
pub struct PremiumStore {
    tx: watch::Sender<bool>,
}

impl PremiumStore {
    pub fn new(initial: bool) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn is_premium(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn set_premium(&self, premium: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == premium {
                return false;
            }
            *current = premium;
            true
        });
        if changed {
            tracing::info!(premium, "premium state changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[derive(Debug)]
pub struct TokensStore {
    tx: watch::Sender<Option<i64>>,
}

impl Default for TokensStore {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }
}

impl TokensStore {
    pub fn balance(&self) -> Option<i64> {
        *self.tx.borrow()
    }

    pub fn update(&self, tokens: i64) {
        self.tx.send_replace(Some(tokens));
        tracing::debug!(tokens, "token balance updated");
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<i64>> {
        self.tx.subscribe()
    }
}
