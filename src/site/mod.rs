//! The website's record kinds
//!
//! | Record | Tag | Policy |
//! |---|---|---|
//! | [`BusinessProfile`] | `business-info` | singleton, created if absent |
//! | [`ContactRequest`] | `contact-request` | append-only |
//! | [`Testimonial`] | `testimonial` | append-only, generated |

mod contact;
mod profile;
mod testimonial;

pub use contact::{submit_contact_request, ContactRequest};
pub use profile::{ensure_profile, get_or_default, load_profile, BusinessProfile};
pub use testimonial::{
    generate_testimonials, list_testimonials, subscribe_testimonials, testimonial_schema,
    Testimonial,
};

use crate::config::Config;
use crate::storage::store::StoreOptions;

/// Store options for a site database
pub fn store_options(config: &Config) -> StoreOptions {
    StoreOptions {
        history: config.history.enabled,
        append_only: vec![
            ContactRequest::TAG.to_string(),
            Testimonial::TAG.to_string(),
        ],
        singleton: vec![BusinessProfile::TAG.to_string()],
    }
}
