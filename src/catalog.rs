//! Relational catalog client: brand lookup, per-image state updates, and
//! content-addressed object/link registration (C5).
//!
//! Grounded on `original_source/src/dbInterface.py` (connection parameters
//! and transaction shape) and `original_source/src/util.py`
//! (`getObjectIds`, `createNewObjects`, `insertObjectsToImage`,
//! `insertLinksToImage`).

use crate::firmware_image::{FileRecord, LinkRecord};
use std::collections::HashMap;
use tokio_postgres::{Client, NoTls};

/// A catalog connection, or none at all when no host was configured (§4.5:
/// the catalog is optional — every method below is then a no-op).
pub enum Catalog {
    Connected(Client),
    Disabled,
}

impl Catalog {
    /// Connects to `host:port`, spawning the connection's background task
    /// onto the current tokio runtime. Returns `Disabled` when `host` is
    /// empty, matching the original's "no database configured" mode.
    pub async fn connect(host: &str, port: u16) -> Result<Self, tokio_postgres::Error> {
        if host.is_empty() {
            return Ok(Catalog::Disabled);
        }
        let conn_str = format!(
            "host={host} port={port} dbname=firmware user=femu password=femu"
        );
        let (client, connection) = tokio_postgres::connect(&conn_str, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("catalog connection closed: {e}");
            }
        });
        Ok(Catalog::Connected(client))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Catalog::Connected(_))
    }

    /// Looks up the brand name registered for `hash`, if any (§4.5).
    pub async fn lookup_brand(&self, hash: &str) -> Result<Option<String>, tokio_postgres::Error> {
        let Catalog::Connected(client) = self else {
            return Ok(None);
        };
        let rows = client
            .query(
                "SELECT b.name FROM brand b JOIN image i ON i.brand_id = b.id WHERE i.hash = $1",
                &[&hash],
            )
            .await?;
        Ok(rows.first().map(|r| r.get::<_, String>(0)))
    }

    /// Updates a single column on the image row for `iid`. Runs in its own
    /// transaction, matching the original's per-call commit semantics.
    pub async fn update_image_field(
        &self,
        iid: &str,
        field: &str,
        value: &str,
    ) -> Result<(), tokio_postgres::Error> {
        let Catalog::Connected(client) = self else {
            return Ok(());
        };
        let query = format!("UPDATE image SET {field} = $1 WHERE iid = $2");
        let tx = client.transaction().await?;
        tx.execute(&query, &[&value, &iid]).await?;
        tx.commit().await
    }

    /// Resolves `hashes` to their `object.id`s, optionally creating rows for
    /// any hash not yet known. Mirrors `util.getObjectIds`: the returned
    /// `missing` list is always the hashes absent *before* insertion,
    /// whether or not `add_missing` went on to create them. Uses
    /// `hash = ANY($1)` parameter binding rather than a string-concatenated
    /// `IN (...)` list, resolving Open Question (iii).
    pub async fn ensure_objects(
        &self,
        hashes: &[String],
        add_missing: bool,
    ) -> Result<(HashMap<String, i64>, Vec<String>), tokio_postgres::Error> {
        let Catalog::Connected(client) = self else {
            return Ok((HashMap::new(), Vec::new()));
        };
        if hashes.is_empty() {
            return Ok((HashMap::new(), Vec::new()));
        }

        let rows = client
            .query("SELECT id, hash FROM object WHERE hash = ANY($1)", &[&hashes])
            .await?;
        let mut object_ids: HashMap<String, i64> = rows
            .into_iter()
            .map(|r| (r.get::<_, String>(1), r.get::<_, i64>(0)))
            .collect();

        let missing: Vec<String> = hashes
            .iter()
            .filter(|h| !object_ids.contains_key(*h))
            .cloned()
            .collect();

        if add_missing && !missing.is_empty() {
            let created = self.create_new_objects(&missing).await?;
            object_ids.extend(created);
        }

        Ok((object_ids, missing))
    }

    /// Inserts a fresh `object` row for each of `hashes`, returning the
    /// hash -> newly assigned id map. Content-addressed: the object table
    /// has no notion of which image contributed a given blob.
    pub async fn create_new_objects(
        &self,
        hashes: &[String],
    ) -> Result<HashMap<String, i64>, tokio_postgres::Error> {
        let Catalog::Connected(client) = self else {
            return Ok(HashMap::new());
        };
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }
        let tx = client.transaction().await?;
        let mut created = HashMap::new();
        for hash in hashes {
            let row = tx
                .query_one("INSERT INTO object (hash) VALUES ($1) RETURNING id", &[hash])
                .await?;
            created.insert(hash.clone(), row.get::<_, i64>(0));
        }
        tx.commit().await?;
        Ok(created)
    }

    /// Associates every file record with image `iid` in `object_to_image`,
    /// keyed by the resolved object id for its content hash. Records whose
    /// hash has no resolved id (not yet created) are silently skipped,
    /// matching `util.insertObjectsToImage`'s `objectIds`-keyed iteration.
    pub async fn insert_objects_to_image(
        &self,
        iid: &str,
        object_ids: &HashMap<String, i64>,
        files: &[FileRecord],
    ) -> Result<(), tokio_postgres::Error> {
        let Catalog::Connected(client) = self else {
            return Ok(());
        };
        if object_ids.is_empty() {
            return Ok(());
        }
        let tx = client.transaction().await?;
        for f in files {
            let Some(&oid) = object_ids.get(&f.md5) else {
                continue;
            };
            tx.execute(
                "INSERT INTO object_to_image (iid, oid, filename, regular_file, uid, gid, permissions) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &iid,
                    &oid,
                    &f.name,
                    &true,
                    &(f.uid as i64),
                    &(f.gid as i64),
                    &(f.mode as i32),
                ],
            )
            .await?;
        }
        tx.commit().await
    }

    /// Associates every symlink with image `iid` in `object_to_image`, with
    /// the sentinel `oid=0`, `regular_file=false`, null uid/gid, and mode
    /// `0o777` that marks a row as a link rather than a content object
    /// (§4.5). The link's target is not itself persisted to the catalog,
    /// matching `util.insertLinksToImage`.
    pub async fn insert_links_to_image(
        &self,
        iid: &str,
        links: &[LinkRecord],
    ) -> Result<(), tokio_postgres::Error> {
        let Catalog::Connected(client) = self else {
            return Ok(());
        };
        if links.is_empty() {
            return Ok(());
        }
        let tx = client.transaction().await?;
        for l in links {
            tx.execute(
                "INSERT INTO object_to_image (iid, oid, filename, regular_file, uid, gid, permissions) \
                 VALUES ($1, 0, $2, false, NULL, NULL, $3)",
                &[&iid, &l.name, &0o777i32],
            )
            .await?;
        }
        tx.commit().await
    }
}
