//! Create-or-update of mirrored entities keyed by their external identity.

use chrono::Utc;
use tracing::debug;

use crate::db::model::{BlogPostFields, RepoFields};
use crate::db::SyncStore;
use crate::error::Result;
use crate::mapper::{truncate_slug, SLUG_MAX_LEN};
use crate::model::{BlogPost, Repository};

/// Upsert a repository by `full_name`, overwriting every mapped field.
pub async fn reconcile_repo(store: &dyn SyncStore, fields: &RepoFields) -> Result<(Repository, bool)> {
    let (repo, created) = store.upsert_repository(fields, Utc::now()).await?;
    debug!(full_name = %repo.full_name, created, "reconciled repository");
    Ok((repo, created))
}

/// Upsert a post by `(source, external_id)`. The slug is first made unique
/// among all posts.
pub async fn reconcile_post(store: &dyn SyncStore, fields: &BlogPostFields) -> Result<(BlogPost, bool)> {
    let own_id = store
        .find_post(fields.source, &fields.external_id)
        .await?
        .map(|post| post.id);
    let slug = unique_slug(store, &fields.slug, own_id).await?;

    let (post, created) = if slug == fields.slug {
        store.upsert_post(fields, Utc::now()).await?
    } else {
        debug!(wanted = %fields.slug, assigned = %slug, "slug taken, using suffix");
        let fields = BlogPostFields {
            slug,
            ..fields.clone()
        };
        store.upsert_post(&fields, Utc::now()).await?
    };
    debug!(source = %post.source, external_id = %post.external_id, created, "reconciled post");
    Ok((post, created))
}

/// First of `base`, `base-2`, `base-3`, … not held by another post. Suffixed
/// candidates cut `base` so the result stays within the slug column limit.
pub async fn unique_slug(store: &dyn SyncStore, base: &str, own_id: Option<i64>) -> Result<String> {
    let mut candidate = base.to_string();
    let mut n: u32 = 2;
    loop {
        match store.slug_owner(&candidate).await? {
            None => return Ok(candidate),
            Some(owner) if Some(owner) == own_id => return Ok(candidate),
            Some(_) => {
                let suffix = format!("-{n}");
                let stem = truncate_slug(base, SLUG_MAX_LEN.saturating_sub(suffix.len()));
                candidate = format!("{stem}{suffix}");
                n += 1;
            }
        }
    }
}
