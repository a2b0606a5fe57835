//! Reconciler for node-level network interfaces (bridges and bonds).
//!
//! PVE stages interface changes in `/etc/network/interfaces.new`; a final
//! `PUT /nodes/{node}/network` commits the pending set. Names omitted from
//! a plan are auto-allocated: the smallest free numeric suffix of the
//! family's prefix.

use crate::core::domain::{
    error::{PveResult, ValidationError},
    model::network::{BondHashPolicy, BondMode, NetworkBond, NetworkBridge, NetworkIfaceInfo},
    value_object::{allocate_iface_name, BondName, BridgeName, IfaceKind, ObjectId},
};
use crate::core::infrastructure::api_client::ApiClient;
use crate::lifecycle::{retry_read, NETWORK_READ_ATTEMPTS};
use log::info;
use std::sync::Arc;

/// Reconciler for bridges and bonds.
pub struct NetworkReconciler {
    client: Arc<ApiClient>,
}

impl NetworkReconciler {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// All interfaces on a node.
    pub async fn list(&self, node: &str) -> PveResult<Vec<NetworkIfaceInfo>> {
        self.client.get(&format!("nodes/{}/network", node)).await
    }

    /// Creates a bridge, commits the pending change set, and waits until
    /// the interface is readable. Returns the (possibly auto-allocated)
    /// name.
    pub async fn create_bridge(&self, bridge: &NetworkBridge) -> PveResult<BridgeName> {
        let name = match &bridge.name {
            Some(name) => name.clone(),
            None => {
                let existing = self.existing_names(&bridge.node).await?;
                BridgeName::new_unchecked(allocate_iface_name(IfaceKind::Bridge, &existing))
            }
        };

        let mut form: Vec<(&str, String)> = vec![
            ("iface", name.as_str().to_string()),
            ("type", "bridge".to_string()),
            ("autostart", if bridge.autostart { "1" } else { "0" }.to_string()),
        ];
        if !bridge.ports.is_empty() {
            form.push(("bridge_ports", bridge.ports.join(" ")));
        }
        if bridge.vlan_aware {
            form.push(("bridge_vlan_aware", "1".to_string()));
        }
        push_address_fields(
            &mut form,
            &bridge.address,
            &bridge.gateway,
            &bridge.address6,
            &bridge.gateway6,
        );
        if let Some(comments) = &bridge.comments {
            form.push(("comments", comments.clone()));
        }

        info!("creating bridge {} on {}", name, bridge.node);
        let _: Option<serde_json::Value> = self
            .client
            .post(&format!("nodes/{}/network", bridge.node), Some(&form))
            .await?;
        self.commit(&bridge.node).await?;
        self.await_iface(&bridge.node, name.as_str()).await?;
        Ok(name)
    }

    /// Creates a bond, commits, waits for readability, and returns the
    /// (possibly auto-allocated) name.
    pub async fn create_bond(&self, bond: &NetworkBond) -> PveResult<BondName> {
        bond.validate()?;
        let name = match &bond.name {
            Some(name) => name.clone(),
            None => {
                let existing = self.existing_names(&bond.node).await?;
                BondName::new_unchecked(allocate_iface_name(IfaceKind::Bond, &existing))
            }
        };

        let mut form: Vec<(&str, String)> = vec![
            ("iface", name.as_str().to_string()),
            ("type", "bond".to_string()),
            ("slaves", bond.slaves.join(" ")),
            ("bond_mode", bond.mode.as_str().to_string()),
            ("autostart", if bond.autostart { "1" } else { "0" }.to_string()),
        ];
        if let Some(policy) = bond.hash_policy {
            form.push(("bond_xmit_hash_policy", policy.as_str().to_string()));
        }
        if let Some(primary) = &bond.primary {
            form.push(("bond-primary", primary.clone()));
        }
        push_address_fields(&mut form, &bond.address, &bond.gateway, &None, &None);
        if let Some(comments) = &bond.comments {
            form.push(("comments", comments.clone()));
        }

        info!("creating bond {} on {}", name, bond.node);
        let _: Option<serde_json::Value> = self
            .client
            .post(&format!("nodes/{}/network", bond.node), Some(&form))
            .await?;
        self.commit(&bond.node).await?;
        self.await_iface(&bond.node, name.as_str()).await?;
        Ok(name)
    }

    /// Reads a bridge by its `{node}/{name}` identifier.
    pub async fn read_bridge(&self, id: &str) -> PveResult<NetworkBridge> {
        let id = ObjectId::parse(id)?;
        let info = self.find_iface(id.node(), id.name(), "bridge").await?;
        Ok(NetworkBridge {
            node: id.node().to_string(),
            name: Some(BridgeName::new(id.name())?),
            ports: info
                .bridge_ports
                .as_deref()
                .map(split_words)
                .unwrap_or_default(),
            address: info.cidr.clone(),
            gateway: info.gateway.clone(),
            address6: info.cidr6.clone(),
            gateway6: info.gateway6.clone(),
            vlan_aware: info.bridge_vlan_aware == Some(1),
            autostart: info.autostart == Some(1),
            comments: info.comments.clone(),
        })
    }

    /// Reads a bond by its `{node}/{name}` identifier.
    pub async fn read_bond(&self, id: &str) -> PveResult<NetworkBond> {
        let id = ObjectId::parse(id)?;
        let info = self.find_iface(id.node(), id.name(), "bond").await?;
        let mode = info
            .bond_mode
            .as_deref()
            .map(BondMode::parse)
            .transpose()?
            .ok_or_else(|| {
                ValidationError::Format(format!("bond '{}' has no mode on the cluster", id))
            })?;
        Ok(NetworkBond {
            node: id.node().to_string(),
            name: Some(BondName::new(id.name())?),
            slaves: info.slaves.as_deref().map(split_words).unwrap_or_default(),
            mode,
            hash_policy: info
                .bond_xmit_hash_policy
                .as_deref()
                .map(BondHashPolicy::parse)
                .transpose()?,
            primary: info.bond_primary.clone(),
            miimon: None,
            address: info.cidr.clone(),
            gateway: info.gateway.clone(),
            autostart: info.autostart == Some(1),
            comments: info.comments.clone(),
        })
    }

    /// Updates an existing bridge in place and commits.
    pub async fn update_bridge(&self, bridge: &NetworkBridge) -> PveResult<()> {
        let name = bridge.name.as_ref().ok_or_else(|| {
            ValidationError::Field {
                field: "name".to_string(),
                message: "updating a bridge requires its name".to_string(),
            }
        })?;
        let mut form: Vec<(&str, String)> = vec![
            ("type", "bridge".to_string()),
            ("autostart", if bridge.autostart { "1" } else { "0" }.to_string()),
        ];
        if !bridge.ports.is_empty() {
            form.push(("bridge_ports", bridge.ports.join(" ")));
        }
        if bridge.vlan_aware {
            form.push(("bridge_vlan_aware", "1".to_string()));
        }
        push_address_fields(
            &mut form,
            &bridge.address,
            &bridge.gateway,
            &bridge.address6,
            &bridge.gateway6,
        );
        if let Some(comments) = &bridge.comments {
            form.push(("comments", comments.clone()));
        }
        let _: Option<serde_json::Value> = self
            .client
            .put(
                &format!("nodes/{}/network/{}", bridge.node, name),
                Some(&form),
            )
            .await?;
        self.commit(&bridge.node).await
    }

    /// Updates an existing bond in place and commits.
    pub async fn update_bond(&self, bond: &NetworkBond) -> PveResult<()> {
        bond.validate()?;
        let name = bond.name.as_ref().ok_or_else(|| {
            ValidationError::Field {
                field: "name".to_string(),
                message: "updating a bond requires its name".to_string(),
            }
        })?;
        let mut form: Vec<(&str, String)> = vec![
            ("type", "bond".to_string()),
            ("slaves", bond.slaves.join(" ")),
            ("bond_mode", bond.mode.as_str().to_string()),
            ("autostart", if bond.autostart { "1" } else { "0" }.to_string()),
        ];
        if let Some(policy) = bond.hash_policy {
            form.push(("bond_xmit_hash_policy", policy.as_str().to_string()));
        }
        if let Some(primary) = &bond.primary {
            form.push(("bond-primary", primary.clone()));
        }
        push_address_fields(&mut form, &bond.address, &bond.gateway, &None, &None);
        if let Some(comments) = &bond.comments {
            form.push(("comments", comments.clone()));
        }
        let _: Option<serde_json::Value> = self
            .client
            .put(&format!("nodes/{}/network/{}", bond.node, name), Some(&form))
            .await?;
        self.commit(&bond.node).await
    }

    /// Removes an interface and commits.
    pub async fn delete(&self, node: &str, iface: &str) -> PveResult<()> {
        info!("deleting interface {} on {}", iface, node);
        let _: Option<serde_json::Value> = self
            .client
            .delete(&format!("nodes/{}/network/{}", node, iface))
            .await?;
        self.commit(node).await
    }

    /// Commits the staged interface changes on a node.
    async fn commit(&self, node: &str) -> PveResult<()> {
        let _: Option<serde_json::Value> = self
            .client
            .put(&format!("nodes/{}/network", node), None::<&()>)
            .await?;
        Ok(())
    }

    async fn await_iface(&self, node: &str, name: &str) -> PveResult<NetworkIfaceInfo> {
        let client = Arc::clone(&self.client);
        let path = format!("nodes/{}/network", node);
        retry_read(
            &format!("interface '{}' on {}", name, node),
            NETWORK_READ_ATTEMPTS,
            || {
                let client = Arc::clone(&client);
                let path = path.clone();
                let name = name.to_string();
                async move {
                    let ifaces: Vec<NetworkIfaceInfo> = client.get(&path).await?;
                    Ok(ifaces.into_iter().find(|i| i.iface == name))
                }
            },
        )
        .await
    }

    async fn find_iface(
        &self,
        node: &str,
        name: &str,
        iface_type: &str,
    ) -> PveResult<NetworkIfaceInfo> {
        let ifaces = self.list(node).await?;
        ifaces
            .into_iter()
            .find(|i| i.iface == name && i.iface_type == iface_type)
            .ok_or_else(|| {
                crate::core::domain::error::PveError::NotFound(format!(
                    "{} '{}' on node '{}'",
                    iface_type, name, node
                ))
            })
    }

    async fn existing_names(&self, node: &str) -> PveResult<Vec<String>> {
        Ok(self
            .list(node)
            .await?
            .into_iter()
            .map(|i| i.iface)
            .collect())
    }
}

fn push_address_fields(
    form: &mut Vec<(&str, String)>,
    address: &Option<String>,
    gateway: &Option<String>,
    address6: &Option<String>,
    gateway6: &Option<String>,
) {
    if let Some(address) = address {
        form.push(("cidr", address.clone()));
    }
    if let Some(gateway) = gateway {
        form.push(("gateway", gateway.clone()));
    }
    if let Some(address6) = address6 {
        form.push(("cidr6", address6.clone()));
    }
    if let Some(gateway6) = gateway6 {
        form.push(("gateway6", gateway6.clone()));
    }
}

fn split_words(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}
