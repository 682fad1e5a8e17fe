//! Administrative commands run through a server's database handles.

use seedlink_core::Document;

use crate::error::{ClientError, ClientResult};
use crate::server::Server;

impl Server {
    /// Drop database `name`. Runs `{dropDatabase: 1}` on `<name>.$cmd`.
    pub async fn drop_database(&self, name: &str) -> ClientResult<Document> {
        self.get_database(name)
            .await
            .run_command(Document::new().with("dropDatabase", 1))
            .await
    }

    /// Names of every database on the server, sorted.
    pub async fn get_database_names(&self) -> ClientResult<Vec<String>> {
        let reply = self
            .admin_database()
            .await
            .run_command(Document::new().with("listDatabases", 1))
            .await?;

        if !reply.contains("databases") {
            return Err(ClientError::InvalidReply {
                command: "listDatabases".to_string(),
                reason: "missing 'databases' field".to_string(),
            });
        }
        let mut names: Vec<String> = reply
            .get_documents("databases")
            .iter()
            .filter_map(|db| db.get_str("name").map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    pub async fn database_exists(&self, name: &str) -> ClientResult<bool> {
        Ok(self.get_database_names().await?.iter().any(|n| n == name))
    }

    /// Rename a collection. Both names are full namespaces (`db.collection`).
    pub async fn rename_collection(&self, old: &str, new: &str) -> ClientResult<Document> {
        self.admin_database()
            .await
            .run_command(
                Document::new()
                    .with("renameCollection", old)
                    .with("to", new),
            )
            .await
    }

    pub fn clone_database(&self, _from_host: &str) -> ClientResult<()> {
        Err(ClientError::NotImplemented("clone_database"))
    }

    pub fn copy_database(&self, _from: &str, _to: &str) -> ClientResult<()> {
        Err(ClientError::NotImplemented("copy_database"))
    }
}
