/// Tunables for a [`crate::Renderer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RendererConfig {
    /// Commits an unresolved portal actively retries before it is parked.
    /// A parked portal still resolves as soon as its target registers.
    pub portal_retry_limit: u32,
    /// Upper bound on render passes inside a single commit.
    pub max_render_passes: usize,
    /// Treat hook order violations as usage errors instead of repairing the slot.
    pub strict_hooks: bool,
    /// Catch panics from render functions and effect bodies. Cleanups and
    /// store listeners are always guarded.
    pub catch_panics: bool,
    /// Log every dispatched mutation at `trace` level.
    pub trace_mutations: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            portal_retry_limit: 8,
            max_render_passes: 32,
            strict_hooks: true,
            catch_panics: true,
            trace_mutations: false,
        }
    }
}

impl RendererConfig {
    /// Defaults overlaid with `TESSEL_DEBUG` and `TESSEL_PORTAL_RETRIES`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if std::env::var_os("TESSEL_DEBUG").is_some() {
            config.trace_mutations = true;
        }
        if let Ok(raw) = std::env::var("TESSEL_PORTAL_RETRIES") {
            match raw.trim().parse() {
                Ok(limit) => config.portal_retry_limit = limit,
                Err(err) => log::warn!("ignoring TESSEL_PORTAL_RETRIES={raw:?}: {err}"),
            }
        }
        config
    }

    pub fn with_portal_retry_limit(mut self, limit: u32) -> Self {
        self.portal_retry_limit = limit;
        self
    }

    pub fn with_max_render_passes(mut self, passes: usize) -> Self {
        self.max_render_passes = passes.max(1);
        self
    }

    pub fn with_strict_hooks(mut self, strict: bool) -> Self {
        self.strict_hooks = strict;
        self
    }

    pub fn with_catch_panics(mut self, catch: bool) -> Self {
        self.catch_panics = catch;
        self
    }

    pub fn with_trace_mutations(mut self, trace: bool) -> Self {
        self.trace_mutations = trace;
        self
    }
}
