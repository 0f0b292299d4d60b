use std::borrow::Cow;

/// Provider identifier - mostly static constants
pub type ProviderId = Cow<'static, str>;

/// Source adapter identifier - mostly static constants
pub type SourceId = Cow<'static, str>;
