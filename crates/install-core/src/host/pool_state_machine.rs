//! Transition rules of pool hosts, which booted a discovery image but are
//! not bound to a cluster yet, plus the bind / unbind / reclaim transitions
//! that move hosts between the pool and a cluster.

use crate::conditions::DisabledValidations;
use crate::host::common::{
    STATUS_INFO_DISCONNECTED, STATUS_INFO_DISCOVERING, STATUS_INFO_INSUFFICIENT_HARDWARE,
    STATUS_INFO_MEDIA_DISCONNECTED, STATUS_INFO_READY_TO_BE_BOUND, STATUS_INFO_RECLAIMING, STATUS_INFO_UNBINDING,
    STATUS_INFO_UNBINDING_PENDING_USER_ACTION,
};
use crate::host::state_machine::{validation, MIN_REQUIRED_HARDWARE};
use crate::host::transition::HostHook;
use crate::host::{HostGuard, HostMachine, HostRule, HostTransitionType as T};
use crate::models::{Host, HostStatus};
use crate::state_machine::StateMachineBuilder;
use crate::validation::HostValidationId;

use HostStatus::*;

const UNBOUND_REFRESH: &[HostStatus] = &[DiscoveringUnbound, InsufficientUnbound, KnownUnbound, DisconnectedUnbound];

/// Appends the pool rules to a host machine builder
pub fn add_pool_rules(sm: &mut StateMachineBuilder<HostMachine>, disabled: &DisabledValidations) {
    let unbound = HostGuard::check("unbound", |host: &Host, _| Ok(host.cluster_id.is_none()));
    sm.add(
        HostRule::new("register-pool-host", T::RegisterHost, [Unregistered], DiscoveringUnbound)
            .when(unbound)
            .then(HostHook::Register),
    )
    .add(
        HostRule::new(
            "re-register-pool-host",
            T::RegisterHost,
            [
                DiscoveringUnbound,
                DisconnectedUnbound,
                InsufficientUnbound,
                KnownUnbound,
                Unbinding,
                UnbindingPendingUserAction,
                ReclaimingRebooting,
            ],
            DiscoveringUnbound,
        )
        .then(HostHook::Register),
    )
    .add(
        HostRule::new("bind-host", T::BindHost, [KnownUnbound], Binding)
            .then(HostHook::Bind),
    )
    .add(
        HostRule::new(
            "unbind-host",
            T::UnbindHost,
            [Known, Discovering, Disconnected, Insufficient, PendingForInput, Binding, Disabled],
            Unbinding,
        )
        .then(HostHook::Unbind(STATUS_INFO_UNBINDING)),
    )
    .add(
        HostRule::new(
            "unbind-host-pending-user-action",
            T::UnbindHost,
            [Error, Cancelled, InstallingPendingUserAction, Resetting, ResettingPendingUserAction],
            UnbindingPendingUserAction,
        )
        .then(HostHook::Unbind(STATUS_INFO_UNBINDING_PENDING_USER_ACTION)),
    )
    .add(
        HostRule::new("reclaim-host", T::ReclaimHost, [Installed, AddedToExistingCluster], Reclaiming)
            .then(HostHook::Unbind(STATUS_INFO_RECLAIMING)),
    )
    .add(
        HostRule::new("media-disconnected-unbound", T::MediaDisconnected, UNBOUND_REFRESH, DisconnectedUnbound)
            .then(HostHook::Status(STATUS_INFO_MEDIA_DISCONNECTED)),
    );

    let connected = validation(HostValidationId::Connected);
    let media = validation(HostValidationId::MediaConnected);
    let has_inventory = validation(HostValidationId::HasInventory);
    let min_hw: HostGuard = disabled.all_enabled(MIN_REQUIRED_HARDWARE);
    let hostname: HostGuard = disabled.all_enabled(&[HostValidationId::HostnameValid]);

    sm.add(
        HostRule::new("refresh-disconnected-unbound", T::Refresh, UNBOUND_REFRESH, DisconnectedUnbound)
            .when(HostGuard::not(connected.clone()))
            .then(HostHook::Status(STATUS_INFO_DISCONNECTED)),
    )
    .add(
        HostRule::new("refresh-media-disconnected-unbound", T::Refresh, UNBOUND_REFRESH, DisconnectedUnbound)
            .when(HostGuard::not(media.clone()))
            .then(HostHook::Status(STATUS_INFO_MEDIA_DISCONNECTED)),
    )
    .add(
        HostRule::new("refresh-discovering-unbound", T::Refresh, UNBOUND_REFRESH, DiscoveringUnbound)
            .when(HostGuard::not(has_inventory))
            .then(HostHook::Status(STATUS_INFO_DISCOVERING)),
    )
    .add(
        HostRule::new("refresh-insufficient-unbound", T::Refresh, UNBOUND_REFRESH, InsufficientUnbound)
            .when(HostGuard::not(HostGuard::all(vec![min_hw, hostname])))
            .then(HostHook::Status(STATUS_INFO_INSUFFICIENT_HARDWARE)),
    )
    .add(
        HostRule::new("refresh-known-unbound", T::Refresh, UNBOUND_REFRESH, KnownUnbound)
            .when(HostGuard::all(vec![connected, media]))
            .then(HostHook::Status(STATUS_INFO_READY_TO_BE_BOUND)),
    );

    for status in [Binding, Unbinding, UnbindingPendingUserAction, Reclaiming, ReclaimingRebooting] {
        sm.add(HostRule::new("refresh-no-op", T::Refresh, [status], status));
    }
}
