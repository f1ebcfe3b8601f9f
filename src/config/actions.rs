/// Logical actions the keyboard surface is normalized into.
///
/// Several actions share a key across views (e.g. `l` opens logs from the list
/// and refreshes them inside the logs view); the state machine decides what an
/// action means for the current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Quit,
    Back,

    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
    Select,

    Refresh,
    Logs,
    Code,
    Metrics,
    Download,
    Filter,
    Command,

    ToggleStream,

    ViewFiles,
    ToggleEdit,
    SaveEdit,
}

impl Action {
    /// Every action, in the order the resolver checks them.
    ///
    /// `SaveEdit` comes first so a modified key is never shadowed by a plain one.
    pub const ALL: [Self; 20] = [
        Self::SaveEdit,
        Self::Quit,
        Self::Back,
        Self::Up,
        Self::Down,
        Self::PageUp,
        Self::PageDown,
        Self::Home,
        Self::End,
        Self::Select,
        Self::Refresh,
        Self::Logs,
        Self::Code,
        Self::Metrics,
        Self::Download,
        Self::Filter,
        Self::Command,
        Self::ToggleStream,
        Self::ViewFiles,
        Self::ToggleEdit,
    ];
}
