use validator::Validate;

/// Profile fields supplied at registration.
#[derive(Debug, Clone, Validate)]
pub struct RegisterProfile {
    /// Unique handle; lowercased to 3-32 chars of `[a-z0-9_]`.
    pub username: String,
    #[validate(length(min = 1, max = 64))]
    pub display_name: String,
    #[validate(length(max = 512))]
    pub bio: Option<String>,
    #[validate(length(max = 512))]
    pub avatar_ref: Option<String>,
}

/// Partial profile update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 64))]
    pub display_name: Option<String>,
    #[validate(length(max = 512))]
    pub bio: Option<String>,
    #[validate(length(max = 512))]
    pub avatar_ref: Option<String>,
    #[validate(length(max = 64))]
    pub title: Option<String>,
    /// Hex color like `#a1b2c3`.
    pub name_color: Option<String>,
}

impl ProfileUpdate {
    /// Whether the update carries no changes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.bio.is_none()
            && self.avatar_ref.is_none()
            && self.title.is_none()
            && self.name_color.is_none()
    }
}
