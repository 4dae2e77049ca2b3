// Contact directory for the current user
// Resolves prior conversation partners and display metadata.

use log::{error, info};

use crate::models::{Contact, CurrentUser};
use crate::rest::RestClient;

/// Asset served by the front end when nobody has a picture.
pub const DEFAULT_AVATAR: &str = "assets/images/default-avatar.png";

/// The list of prior conversation partners, loaded once per session open.
/// A load failure degrades to an empty list; conversations reached by deep
/// link then run against a placeholder contact.
pub struct ContactDirectory {
    rest: RestClient,
    me: CurrentUser,
    contacts: Vec<Contact>,
}

impl ContactDirectory {
    pub fn new(rest: RestClient, me: CurrentUser) -> ContactDirectory {
        ContactDirectory {
            rest,
            me,
            contacts: Vec::new(),
        }
    }

    pub async fn load(&mut self) -> &[Contact] {
        match self.rest.fetch_conversations(&self.me.user_id).await {
            Ok(contacts) => {
                info!("Loaded {} conversation contact(s)", contacts.len());
                self.contacts = contacts;
            }
            Err(e) => {
                error!("Failed to load contacts: {}", e);
                self.contacts.clear();
            }
        }
        &self.contacts
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn find(&self, user_id: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.user_id == user_id)
    }

    /// The directory's record for `user_id`, or a synthetic id-only contact
    /// so an externally-linked conversation still works.
    pub fn contact_or_placeholder(&self, user_id: &str) -> Contact {
        match self.find(user_id) {
            Some(contact) => contact.clone(),
            None => Contact::placeholder(user_id),
        }
    }

    /// Avatar for any message author: self resolves to the cached profile
    /// picture, known contacts to their directory entry, everyone else to
    /// the bundled default.
    pub fn resolve_avatar(&self, user_id: &str) -> String {
        if user_id == self.me.user_id {
            return self
                .me
                .profile_picture_url
                .clone()
                .unwrap_or_else(|| DEFAULT_AVATAR.to_string());
        }
        self.find(user_id)
            .and_then(|c| c.profile_picture_url.clone())
            .unwrap_or_else(|| DEFAULT_AVATAR.to_string())
    }
}
