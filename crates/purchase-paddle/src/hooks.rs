//! Host UI hooks invoked while a checkout is on screen

/// Callbacks into the host's purchase UI
///
/// Errors abort the purchase with an event handler error.
pub trait PurchaseUiHooks: Send + Sync {
    /// The checkout overlay finished loading
    fn on_checkout_loaded(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// The customer dismissed the overlay; tear down the purchase UI
    fn unmount_purchase_ui(&self) -> anyhow::Result<()>;
}

/// Hooks that only log
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingHooks;

impl PurchaseUiHooks for TracingHooks {
    fn on_checkout_loaded(&self) -> anyhow::Result<()> {
        tracing::info!("Checkout loaded");
        Ok(())
    }

    fn unmount_purchase_ui(&self) -> anyhow::Result<()> {
        tracing::info!("Unmounting purchase UI");
        Ok(())
    }
}
