use reqwest::Method;

use super::{
    client::ApiClient,
    error::ApiError,
    types::{ClientListResponse, ClientResponse},
};

impl ApiClient {
    pub async fn list_clients(&self) -> Result<Vec<ClientResponse>, ApiError> {
        let list: ClientListResponse = self.send(self.request(Method::GET, "/client")).await?;
        Ok(list.clients)
    }
}
